use colored::Colorize;
use std::sync::Arc;
use testdock_container::{ContainerRuntime, DockerRuntime};

/// Docker に接続する。失敗した場合は対処方法を表示する
pub async fn init_runtime_with_error_handling() -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    match DockerRuntime::connect().await {
        Ok(runtime) => Ok(Arc::new(runtime)),
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Docker接続エラー".red().bold());
            eprintln!();
            eprintln!("{}", "原因:".yellow());
            eprintln!("  {}", e);
            eprintln!();
            eprintln!("{}", "解決方法:".yellow());
            eprintln!("  • Dockerが起動しているか確認してください");
            eprintln!("  • DOCKER_HOST が正しいソケットを指しているか確認してください");
            eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
            Err(anyhow::anyhow!("Docker接続に失敗しました"))
        }
    }
}
