use crate::commands::wait_for_interrupt;
use colored::Colorize;
use std::sync::Arc;
use testdock_container::{ContainerHandle, ContainerRuntime, Settings};

pub struct RunOptions {
    pub image: String,
    pub env: Vec<(String, String)>,
    pub ports: Vec<u16>,
    pub name: Option<String>,
    pub network: Option<String>,
    pub command: Option<String>,
}

pub fn container_handle(
    runtime: Arc<dyn ContainerRuntime>,
    settings: &Settings,
    options: RunOptions,
) -> ContainerHandle {
    let mut handle = ContainerHandle::new(runtime, options.image)
        .with_settings(settings)
        .with_exposed_ports(options.ports);

    for (key, value) in options.env {
        handle = handle.with_env(key, value);
    }
    if let Some(name) = options.name {
        handle = handle.with_name(name);
    }
    if let Some(network) = options.network {
        handle = handle.with_network(network);
    }
    if let Some(command) = options.command {
        handle = handle.with_command(command);
    }

    handle
}

pub async fn handle(
    runtime: Arc<dyn ContainerRuntime>,
    settings: &Settings,
    options: RunOptions,
) -> anyhow::Result<()> {
    let ports = options.ports.clone();
    let handle = container_handle(runtime, settings, options);

    println!(
        "{} {}",
        "コンテナを起動中:".blue(),
        handle.config().image.cyan()
    );

    handle
        .run_scoped(|container| {
            Box::pin(async move {
                println!(
                    "{} {} ({})",
                    "✓ 起動しました:".green(),
                    container.name().unwrap_or_default().cyan(),
                    container.short_id().unwrap_or_default()
                );

                if !ports.is_empty() {
                    println!();
                    println!("{}", "ポート:".bold());
                }
                for port in ports {
                    let host = container.get_container_host_ip(port)?;
                    let exposed = container.get_exposed_port(port).await?;
                    println!("  {} → {}:{}", port, host, exposed);
                }
                if let Some(ip) = container.get_host_ip() {
                    println!("  {} {}", "コンテナIP:".bold(), ip);
                }

                wait_for_interrupt().await
            })
        })
        .await?;

    println!("{}", "✓ コンテナを停止しました".green());
    Ok(())
}

/// `KEY=VALUE` 形式の環境変数指定を分解する
pub fn parse_env_pair(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("KEY=VALUE 形式で指定してください: {}", value)),
    }
}
