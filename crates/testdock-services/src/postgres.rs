use crate::service::{
    ReadinessCheck, ServiceHandle, internal_host, readiness_check, resolve_endpoint,
    start_and_wait,
};
use crate::url::{build_jdbc_url, build_postgres_url};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use testdock_container::{
    ContainerError, ContainerHandle, ContainerRuntime, Result, Settings, WaitConfig,
};

pub const DEFAULT_IMAGE: &str = "postgres:11-alpine";
pub const DEFAULT_USER: &str = "user";
pub const DEFAULT_PASSWORD: &str = "pass";
pub const DEFAULT_PORT: u16 = 5432;

/// PostgreSQL コンテナ
///
/// `start()` は接続確認が一度成功するまで戻らない。
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use testdock_container::DockerRuntime;
/// use testdock_services::{PostgresContainer, ServiceHandle};
///
/// # async fn demo() -> testdock_container::Result<()> {
/// let runtime = Arc::new(DockerRuntime::connect().await?);
/// let mut pg = PostgresContainer::new(runtime, |url: String| async move {
///     // 実際にはDBドライバで接続を試みる
///     if url.is_empty() { Err("no url") } else { Ok(()) }
/// })
/// .with_database("app");
///
/// pg.start().await?;
/// println!("{}", pg.connection_url().await?);
/// pg.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct PostgresContainer {
    container: ContainerHandle,
    check: ReadinessCheck,
    readiness: WaitConfig,
    user: String,
    password: String,
    database: Option<String>,
    port: u16,
}

impl PostgresContainer {
    pub fn new<F, Fut, E>(runtime: Arc<dyn ContainerRuntime>, check: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Display,
    {
        Self {
            container: ContainerHandle::new(runtime, DEFAULT_IMAGE),
            check: readiness_check(check),
            readiness: WaitConfig::default(),
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            database: None,
            port: DEFAULT_PORT,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// 未指定の場合はユーザー名と同じ
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.container.config_mut().image = image.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_readiness(mut self, readiness: WaitConfig) -> Self {
        self.readiness = readiness;
        self
    }

    /// 環境変数の設定を待機設定とコンテナに反映
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.readiness = settings.readiness;
        self.with_container(|c| c.with_settings(settings))
    }

    /// 内部のコンテナハンドルに追加の設定を行う
    pub fn with_container(mut self, f: impl FnOnce(ContainerHandle) -> ContainerHandle) -> Self {
        self.container = f(self.container);
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or(&self.user)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn configure(&mut self) {
        let database = self.database().to_string();
        let config = self.container.config_mut();
        config.expose_port(self.port);
        config.set_env("POSTGRES_USER", self.user.clone());
        config.set_env("POSTGRES_PASSWORD", self.password.clone());
        config.set_env("POSTGRES_DB", database);
    }

    /// JDBC 形式の接続URL（コンテナのアドレスとコンテナポート）
    pub fn jdbc_connection_url(&self) -> Result<String> {
        let host = internal_host(&self.container)?;
        Ok(build_jdbc_url(&host, self.port, self.database()))
    }

    /// 起動 → 本体実行 → 停止 をまとめて行う
    pub async fn run_scoped<T, E, F>(self, body: F) -> std::result::Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut PostgresContainer) -> BoxFuture<'a, std::result::Result<T, E>>,
        E: From<ContainerError>,
    {
        crate::service::run_scoped(self, body).await
    }
}

#[async_trait]
impl ServiceHandle for PostgresContainer {
    fn container(&self) -> &ContainerHandle {
        &self.container
    }

    fn container_mut(&mut self) -> &mut ContainerHandle {
        &mut self.container
    }

    async fn start(&mut self) -> Result<()> {
        self.configure();
        let readiness = self.readiness;
        let check = self.check.clone();
        start_and_wait(self, &readiness, &check).await
    }

    async fn connection_url(&mut self) -> Result<String> {
        let (host, port) = resolve_endpoint(&mut self.container, self.port).await?;
        Ok(build_postgres_url(
            &self.user,
            &self.password,
            &host,
            port,
            self.database(),
        ))
    }

    fn external_connection_url(&self) -> Result<String> {
        let host = internal_host(&self.container)?;
        Ok(build_postgres_url(
            &self.user,
            &self.password,
            &host,
            self.port,
            self.database(),
        ))
    }
}
