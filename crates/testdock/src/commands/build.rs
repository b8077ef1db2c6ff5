use crate::commands::wait_for_interrupt;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use testdock_build::BuildContext;
use testdock_container::ContainerRuntime;

pub async fn handle(
    runtime: Arc<dyn ContainerRuntime>,
    path: PathBuf,
    keep: bool,
) -> anyhow::Result<()> {
    println!(
        "{} {}",
        "イメージをビルド中:".blue(),
        path.display().to_string().cyan()
    );

    let mut context = BuildContext::new(runtime, path);
    let image_id = match context.build().await {
        Ok(id) => id.to_string(),
        Err(e) => return Err(anyhow::anyhow!(e.user_message())),
    };

    println!("{} {}", "✓ ビルド完了:".green(), image_id);

    if keep {
        context.into_image_id();
        println!("{}", "イメージは削除されずに残ります".dimmed());
        return Ok(());
    }

    let held = wait_for_interrupt().await;
    context
        .remove()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("{}", "✓ イメージを削除しました".green());
    held
}
