//! サービスハンドル共通の起動手順
//!
//! 設定 → 起動 → reload → 接続確認（準備完了待機）の順に進め、
//! 接続確認までのどこかで失敗した場合はコンテナを削除してからエラーを返す。

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use testdock_container::{
    ContainerError, ContainerHandle, ContainerState, Result, WaitConfig, wait_until_ready,
};
use tracing::{debug, warn};

/// 接続URLを受け取り、実際にプロトコルレベルで接続できるか確認する関数
pub type ReadinessCheck =
    Arc<dyn Fn(String) -> BoxFuture<'static, std::result::Result<(), String>> + Send + Sync>;

/// 任意の非同期関数を [`ReadinessCheck`] に変換する
///
/// エラーは「まだ準備できていない」として扱われ、メッセージだけが保持される。
pub fn readiness_check<F, Fut, E>(check: F) -> ReadinessCheck
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: Display,
{
    Arc::new(move |url| {
        let fut = check(url);
        async move { fut.await.map_err(|e| e.to_string()) }.boxed()
    })
}

/// 特定サービス向けに設定済みのコンテナ
#[async_trait]
pub trait ServiceHandle: Send {
    fn container(&self) -> &ContainerHandle;

    fn container_mut(&mut self) -> &mut ContainerHandle;

    /// 起動して接続できる状態になるまで待つ
    async fn start(&mut self) -> Result<()>;

    /// 呼び出し元の配置に応じた接続URL
    async fn connection_url(&mut self) -> Result<String>;

    /// 同一ネットワーク上の別コンテナから使う接続URL
    fn external_connection_url(&self) -> Result<String>;

    async fn stop(&mut self) -> Result<()> {
        self.container_mut().stop().await
    }
}

/// 接続先のホストとポートを解決する
///
/// コンテナ内からはコンテナのアドレスとコンテナポート、
/// ホストからはホストIPと割り当てられたホストポートを使う。
pub async fn resolve_endpoint(container: &mut ContainerHandle, port: u16) -> Result<(String, u16)> {
    if container.placement().is_inside_container() {
        let host = internal_host(container)?;
        return Ok((host, port));
    }

    let host = container.get_container_host_ip(port)?;
    let host_port = container.get_exposed_port(port).await?;
    Ok((host, host_port))
}

/// bridge ネットワークのIP。bridge に接続していない場合はコンテナ名
pub fn internal_host(container: &ContainerHandle) -> Result<String> {
    container
        .get_host_ip()
        .or_else(|| container.name())
        .map(String::from)
        .ok_or(ContainerError::NotStarted)
}

/// 起動から接続確認までを行う
///
/// 失敗した場合、起動済みのコンテナは削除される。
/// 一度起動したハンドルには `AlreadyStarted` を返し、コンテナには触れない。
pub async fn start_and_wait<S>(
    service: &mut S,
    readiness: &WaitConfig,
    check: &ReadinessCheck,
) -> Result<()>
where
    S: ServiceHandle + ?Sized,
{
    if service.container().state() != ContainerState::Unstarted {
        return Err(ContainerError::AlreadyStarted);
    }

    let outcome: Result<()> = async {
        service.container_mut().start().await?;
        service.container_mut().reload().await?;

        let url = service.connection_url().await?;
        debug!("Checking connection to {}", service.container().config().image);
        wait_until_ready(readiness, || check(url.clone())).await
    }
    .await;

    if let Err(e) = &outcome {
        debug!("Service failed to become ready: {}", e);
        if let Err(stop_err) = service.stop().await {
            warn!("Failed to remove container after startup failure: {}", stop_err);
        }
    }

    outcome
}

/// 起動 → 本体実行 → 停止 をまとめて行う
///
/// 本体が失敗・panic しても停止は必ず一度だけ行われる。
pub async fn run_scoped<S, T, E, F>(mut service: S, body: F) -> std::result::Result<T, E>
where
    S: ServiceHandle,
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, std::result::Result<T, E>>,
    E: From<ContainerError>,
{
    // 起動失敗時の削除は start 側で済んでいる
    service.start().await?;

    let outcome = AssertUnwindSafe(body(&mut service)).catch_unwind().await;
    let stopped = service.stop().await;

    match outcome {
        Ok(Ok(value)) => {
            stopped?;
            Ok(value)
        }
        Ok(Err(e)) => {
            if let Err(stop_err) = stopped {
                warn!("Failed to remove container: {}", stop_err);
            }
            Err(e)
        }
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
