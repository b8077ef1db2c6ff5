use crate::service::{
    ReadinessCheck, ServiceHandle, internal_host, readiness_check, resolve_endpoint,
    start_and_wait,
};
use crate::url::build_amqp_url;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use testdock_container::{
    ContainerError, ContainerHandle, ContainerRuntime, Result, Settings, WaitConfig,
};
use tracing::debug;

pub const DEFAULT_IMAGE: &str = "rabbitmq:3-management-alpine";
pub const DEFAULT_USER: &str = "guest";
pub const DEFAULT_PASSWORD: &str = "guest";
pub const DEFAULT_ERLANG_COOKIE: &str = "rabbitmq";
pub const DEFAULT_PORT: u16 = 5672;
pub const DEFAULT_MANAGEMENT_PORT: u16 = 15672;

/// RabbitMQ コンテナ
///
/// AMQP ポートに加えて管理UIのポートも公開する。
pub struct RabbitContainer {
    container: ContainerHandle,
    check: ReadinessCheck,
    readiness: WaitConfig,
    user: String,
    password: String,
    erlang_cookie: String,
    port: u16,
    management_port: Option<u16>,
}

impl RabbitContainer {
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
            erlang_cookie: DEFAULT_ERLANG_COOKIE.to_string(),
            port: DEFAULT_PORT,
            management_port: Some(DEFAULT_MANAGEMENT_PORT),
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

    pub fn with_erlang_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.erlang_cookie = cookie.into();
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

    pub fn with_management_port(mut self, port: u16) -> Self {
        self.management_port = Some(port);
        self
    }

    /// 管理UIのポートを公開しない（管理プラグインのないイメージ向け）
    pub fn without_management(mut self) -> Self {
        self.management_port = None;
        self
    }

    pub fn with_readiness(mut self, readiness: WaitConfig) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.readiness = settings.readiness;
        self.with_container(|c| c.with_settings(settings))
    }

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

    pub fn erlang_cookie(&self) -> &str {
        &self.erlang_cookie
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn management_port(&self) -> Option<u16> {
        self.management_port
    }

    fn configure(&mut self) {
        let config = self.container.config_mut();
        config.expose_port(self.port);
        if let Some(management_port) = self.management_port {
            config.expose_port(management_port);
        }
        config.set_env("RABBITMQ_ERLANG_COOKIE", self.erlang_cookie.clone());
        config.set_env("RABBITMQ_DEFAULT_USER", self.user.clone());
        config.set_env("RABBITMQ_DEFAULT_PASS", self.password.clone());
    }

    /// 管理UIに割り当てられたポートをログに出す。失敗しても起動は成功扱い
    async fn report_management_port(&mut self) {
        let Some(management_port) = self.management_port else {
            return;
        };

        match self.container.get_exposed_port(management_port).await {
            Ok(port) => debug!("RabbitMQ management available on port {}", port),
            Err(e) => debug!("RabbitMQ management port not resolved: {}", e),
        }
    }

    pub async fn run_scoped<T, E, F>(self, body: F) -> std::result::Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut RabbitContainer) -> BoxFuture<'a, std::result::Result<T, E>>,
        E: From<ContainerError>,
    {
        crate::service::run_scoped(self, body).await
    }
}

#[async_trait]
impl ServiceHandle for RabbitContainer {
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
        start_and_wait(self, &readiness, &check).await?;

        self.report_management_port().await;
        Ok(())
    }

    async fn connection_url(&mut self) -> Result<String> {
        let (host, port) = resolve_endpoint(&mut self.container, self.port).await?;
        Ok(build_amqp_url(&self.user, &self.password, &host, port))
    }

    fn external_connection_url(&self) -> Result<String> {
        let host = internal_host(&self.container)?;
        Ok(build_amqp_url(&self.user, &self.password, &host, self.port))
    }
}
