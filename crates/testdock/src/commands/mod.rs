pub mod build;
pub mod run;
pub mod service;

use colored::Colorize;

/// Ctrl+C が押されるまで待つ
pub async fn wait_for_interrupt() -> anyhow::Result<()> {
    println!();
    println!("{}", "Ctrl+C で停止して削除します".dimmed());
    tokio::signal::ctrl_c().await?;
    println!();
    Ok(())
}
