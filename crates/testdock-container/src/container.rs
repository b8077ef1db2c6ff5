//! コンテナハンドル
//!
//! 一つのコンテナについて、起動前の設定・ライフサイクル操作・
//! 接続先（ホストIP・公開ポート）の解決をまとめて扱う。
//!
//! 後始末はスコープ付き実行 [`ContainerHandle::run_scoped`] か明示的な
//! [`ContainerHandle::stop`] で行う。Drop 時の削除はベストエフォートで、
//! エラーはすべて握りつぶされる。

use crate::config::{DEFAULT_PORT_RESOLVE_ATTEMPTS, Settings};
use crate::definition::{ContainerConfig, VolumeMode};
use crate::converter::split_command;
use crate::env::{Placement, inside_container};
use crate::error::{ContainerError, Result};
use crate::runtime::{
    ContainerDetails, ContainerIdentity, ContainerRuntime, ExecOutput, HostBinding, LogLine,
};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// ホスト側ポート解決の試行間隔
pub const PORT_RESOLVE_INTERVAL: Duration = Duration::from_secs(1);

/// コンテナ外から接続する場合のホストアドレス
pub const WILDCARD_HOST: &str = "0.0.0.0";

/// ハンドルの状態
///
/// `Unstarted → Running → Stopped` の一方向にのみ遷移する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Unstarted,
    Running,
    Stopped,
}

pub struct ContainerHandle {
    runtime: Arc<dyn ContainerRuntime>,
    config: ContainerConfig,
    placement: Placement,
    port_resolve_attempts: u32,
    state: ContainerState,
    identity: Option<ContainerIdentity>,
    details: Option<ContainerDetails>,
    /// 生成時に読めなかった環境変数設定。start で報告する
    settings_error: Option<String>,
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("config", &self.config)
            .field("placement", &self.placement)
            .field("state", &self.state)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ContainerHandle {
    /// 配置は環境変数とマーカーファイルから判定する
    ///
    /// 環境変数の値が不正な場合、`start` が `ConfigError` を返す。
    /// 配置を明示した場合は環境変数を使わない。
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: impl Into<String>) -> Self {
        let (placement, settings_error) = match Placement::detect() {
            Ok(placement) => (placement, None),
            Err(e) => {
                warn!("Invalid testdock environment settings: {}", e);
                let message = match e {
                    ContainerError::ConfigError(message) => message,
                    other => other.to_string(),
                };
                (Placement::from_inside(inside_container()), Some(message))
            }
        };

        Self {
            runtime,
            config: ContainerConfig::new(image),
            placement,
            port_resolve_attempts: DEFAULT_PORT_RESOLVE_ATTEMPTS,
            state: ContainerState::Unstarted,
            identity: None,
            details: None,
            settings_error,
        }
    }

    /// 読み込み済みの設定を反映
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        if let Some(inside) = settings.inside_container {
            self.placement = Placement::from_inside(inside);
            self.settings_error = None;
        }
        self.with_port_resolve_attempts(settings.port_resolve_attempts)
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.set_env(key, value);
        self
    }

    /// ホストポートをランタイムに割り当てさせて公開する
    pub fn with_exposed_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        for port in ports {
            self.config.expose_port(port);
        }
        self
    }

    pub fn with_bind_port(mut self, container_port: u16, host_port: Option<u16>) -> Self {
        self.config.bind_port(container_port, host_port);
        self
    }

    pub fn with_volume_mapping(
        mut self,
        host_path: impl Into<String>,
        container_path: impl Into<String>,
        mode: VolumeMode,
    ) -> Self {
        self.config.add_volume(host_path, container_path, mode);
        self
    }

    pub fn with_link(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.config.add_link(alias, target);
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.config.command = Some(command.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.config.network = Some(network.into());
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self.settings_error = None;
        self
    }

    /// ホスト側ポート解決の試行回数。最低1回は確認する
    pub fn with_port_resolve_attempts(mut self, attempts: u32) -> Self {
        self.port_resolve_attempts = attempts.max(1);
        self
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ContainerConfig {
        &mut self.config
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }

    pub fn short_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.short_id())
    }

    pub fn name(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.name.as_str())
    }

    /// 最後に reload した時点のコンテナ情報
    pub fn details(&self) -> Option<&ContainerDetails> {
        self.details.as_ref()
    }

    fn running_id(&self) -> Result<&str> {
        match (&self.state, &self.identity) {
            (ContainerState::Running, Some(identity)) => Ok(identity.id.as_str()),
            _ => Err(ContainerError::NotStarted),
        }
    }

    /// コンテナを作成してデタッチ状態で起動する
    ///
    /// 準備完了の待機は行わない（サービスハンドルの責務）。
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ContainerState::Unstarted {
            return Err(ContainerError::AlreadyStarted);
        }
        if let Some(message) = &self.settings_error {
            return Err(ContainerError::ConfigError(message.clone()));
        }
        if let Some(command) = &self.config.command {
            split_command(command)?;
        }

        debug!("Starting container from image {}", self.config.image);
        let identity = self.runtime.run_container(&self.config).await?;
        debug!("Container started: {}", identity.short_id());

        self.identity = Some(identity);
        self.state = ContainerState::Running;

        self.reload().await
    }

    /// コンテナを強制削除する（ボリュームも削除）
    pub async fn stop(&mut self) -> Result<()> {
        self.stop_with(true, true).await
    }

    /// コンテナを削除する。起動していなければ何もしない
    pub async fn stop_with(&mut self, force: bool, delete_volumes: bool) -> Result<()> {
        let id = match self.running_id() {
            Ok(id) => id.to_string(),
            Err(_) => return Ok(()),
        };

        self.runtime
            .remove_container(&id, force, delete_volumes)
            .await?;
        debug!("Container removed: {}", self.short_id().unwrap_or(&id));

        self.state = ContainerState::Stopped;
        self.details = None;
        Ok(())
    }

    /// コンテナの終了を待つ。起動していなければ `None`
    pub async fn wait(&self) -> Result<Option<i64>> {
        match self.running_id() {
            Ok(id) => Ok(Some(self.runtime.wait_container(id).await?)),
            Err(_) => Ok(None),
        }
    }

    /// ログのストリーム。起動していなければ空
    pub fn logs(&self) -> BoxStream<'_, Result<LogLine>> {
        match self.running_id() {
            Ok(id) => self.runtime.logs(id),
            Err(_) => stream::empty().boxed(),
        }
    }

    /// ランタイムからコンテナ情報を再取得する
    ///
    /// ホストポートは起動直後には割り当てられていないことがあるため、
    /// 公開ポートを読む前に呼ぶ必要がある。
    pub async fn reload(&mut self) -> Result<()> {
        let id = match self.running_id() {
            Ok(id) => id.to_string(),
            Err(_) => return Ok(()),
        };

        let details = self.runtime.inspect_container(&id).await?;
        if let Some(identity) = self.identity.as_mut()
            && !details.name.is_empty()
        {
            identity.name = details.name.clone();
        }
        self.details = Some(details);
        Ok(())
    }

    /// コンテナ内でコマンドを実行する
    pub async fn exec<I, S>(&self, command: I) -> Result<ExecOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.running_id()?;
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        debug!("Exec in {}: {:?}", id, command);
        self.runtime.exec(id, command).await
    }

    /// キャッシュ済みの `{port}/tcp` の最初のバインディング
    pub fn get_container_port(&self, port: u16) -> Option<&HostBinding> {
        self.details.as_ref().and_then(|d| d.tcp_binding(port))
    }

    fn cached_host_port(&self, port: u16) -> Option<u16> {
        self.get_container_port(port)
            .and_then(|binding| binding.host_port.parse::<u16>().ok())
    }

    /// 接続に使うポートを解決する
    ///
    /// コンテナ内から呼ばれた場合は同一ネットワーク上のコンテナポートをそのまま返す。
    /// ホストから呼ばれた場合は、ランタイムがホストポートを割り当てるまで
    /// 1秒間隔で再取得する。
    pub async fn get_exposed_port(&mut self, port: u16) -> Result<u16> {
        self.running_id()?;

        if self.placement.is_inside_container() {
            return Ok(port);
        }

        for attempt in 0..self.port_resolve_attempts {
            if attempt > 0 {
                tokio::time::sleep(PORT_RESOLVE_INTERVAL).await;
            }
            if attempt > 0 || self.details.is_none() {
                self.reload().await?;
            }
            if let Some(host_port) = self.cached_host_port(port) {
                return Ok(host_port);
            }
        }

        Err(ContainerError::PortNotExposed {
            port,
            attempts: self.port_resolve_attempts,
        })
    }

    /// 接続先のホストIP
    ///
    /// コンテナ内からはバインディングのホストIP（空文字列は全インターフェース）、
    /// ホストからはワイルドカードアドレスを返す。
    pub fn get_container_host_ip(&self, port: u16) -> Result<String> {
        self.running_id()?;

        if self.placement.is_inside_container() {
            return Ok(self
                .get_container_port(port)
                .map(|binding| binding.host_ip.clone())
                .unwrap_or_default());
        }

        Ok(WILDCARD_HOST.to_string())
    }

    /// デフォルト bridge ネットワーク上のコンテナのIPアドレス
    pub fn get_host_ip(&self) -> Option<&str> {
        self.running_id().ok()?;
        self.details.as_ref()?.bridge_ip.as_deref()
    }

    /// 起動 → 本体実行 → 停止 をまとめて行う
    ///
    /// 本体が `Err` を返しても panic しても停止は必ず一度だけ行われる。
    /// 起動に失敗した場合は本体を実行しない。
    pub async fn run_scoped<T, E, F>(mut self, body: F) -> std::result::Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut ContainerHandle) -> BoxFuture<'a, std::result::Result<T, E>>,
        E: From<ContainerError>,
    {
        if let Err(e) = self.start().await {
            // reload で失敗した場合はコンテナが残っている
            if let Err(stop_err) = self.stop().await {
                warn!("Failed to remove container after start failure: {}", stop_err);
            }
            return Err(e.into());
        }

        let outcome = AssertUnwindSafe(body(&mut self)).catch_unwind().await;
        let stopped = self.stop().await;

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
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.state != ContainerState::Running {
            return;
        }
        let Some(identity) = self.identity.take() else {
            return;
        };

        // 非同期ランタイム外では削除できないため諦める
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(
                "No async runtime available, container {} left running",
                identity.short_id()
            );
            return;
        };

        let runtime = self.runtime.clone();
        handle.spawn(async move {
            if let Err(e) = runtime.remove_container(&identity.id, true, true).await {
                debug!(
                    "Best-effort removal of {} failed: {}",
                    identity.short_id(),
                    e
                );
            }
        });
    }
}
