//! テスト用のインメモリ ContainerRuntime
//!
//! Docker デーモンなしでハンドルのライフサイクルを検証するためのスタブ。
//! 呼び出し回数と削除済みコンテナを記録し、報告するホストポートや
//! exec の結果をテストから指定できる。
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use testdock_container::testing::FakeRuntime;
//! use testdock_container::ContainerHandle;
//!
//! # async fn demo() {
//! let runtime = Arc::new(FakeRuntime::new().with_host_port(5432, 49153));
//! let mut handle = ContainerHandle::new(runtime.clone(), "postgres:11-alpine")
//!     .with_exposed_ports([5432]);
//! handle.start().await.unwrap();
//! assert_eq!(runtime.run_count(), 1);
//! # }
//! ```

use crate::definition::ContainerConfig;
use crate::error::{ContainerError, Result};
use crate::runtime::{
    ContainerDetails, ContainerRuntime, ExecOutput, HostBinding, LogLine, LogStream,
    tcp_port_key,
};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    config: ContainerConfig,
    removed: bool,
    inspections: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u32,
    containers: HashMap<String, FakeContainer>,
    run_count: u32,
    remove_count: u32,
    inspect_count: u32,
    exec_count: u32,
    wait_count: u32,
    last_exec: Option<Vec<String>>,
    built_images: Vec<String>,
    removed_images: Vec<String>,
}

/// 設定可能なインメモリランタイム
#[derive(Debug, Default)]
pub struct FakeRuntime {
    host_ports: HashMap<u16, u16>,
    bridge_ip: Option<String>,
    ports_after_inspections: u32,
    exec_output: ExecOutput,
    exit_code: i64,
    logs: Vec<String>,
    fail_run: bool,
    fail_start: bool,
    fail_build: bool,
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            bridge_ip: Some("172.17.0.2".to_string()),
            exec_output: ExecOutput {
                exit_code: Some(0),
                output: Vec::new(),
            },
            ..Default::default()
        }
    }

    /// コンテナポートに対して報告するホストポート
    pub fn with_host_port(mut self, container_port: u16, host_port: u16) -> Self {
        self.host_ports.insert(container_port, host_port);
        self
    }

    pub fn with_bridge_ip(mut self, ip: Option<&str>) -> Self {
        self.bridge_ip = ip.map(String::from);
        self
    }

    /// 指定回数の inspect まではポートを未割り当てとして報告する
    pub fn with_ports_after_inspections(mut self, inspections: u32) -> Self {
        self.ports_after_inspections = inspections;
        self
    }

    pub fn with_exec_output(mut self, exit_code: i64, output: &[u8]) -> Self {
        self.exec_output = ExecOutput {
            exit_code: Some(exit_code),
            output: output.to_vec(),
        };
        self
    }

    pub fn with_exit_code(mut self, exit_code: i64) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_logs<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.logs = lines.into_iter().map(Into::into).collect();
        self
    }

    /// コンテナ起動を常に失敗させる
    pub fn failing_run(mut self) -> Self {
        self.fail_run = true;
        self
    }

    /// コンテナ作成は成功させ、起動だけを失敗させる
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// イメージビルドを常に失敗させる
    pub fn failing_build(mut self) -> Self {
        self.fail_build = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn run_count(&self) -> u32 {
        self.state().run_count
    }

    pub fn remove_count(&self) -> u32 {
        self.state().remove_count
    }

    pub fn inspect_count(&self) -> u32 {
        self.state().inspect_count
    }

    pub fn exec_count(&self) -> u32 {
        self.state().exec_count
    }

    pub fn wait_count(&self) -> u32 {
        self.state().wait_count
    }

    pub fn last_exec(&self) -> Option<Vec<String>> {
        self.state().last_exec.clone()
    }

    /// 最後に起動したコンテナの設定
    pub fn last_config(&self) -> Option<ContainerConfig> {
        let state = self.state();
        let id = fake_id(state.next_id);
        state.containers.get(&id).map(|c| c.config.clone())
    }

    pub fn is_removed(&self, id: &str) -> bool {
        self.state()
            .containers
            .get(id)
            .map(|c| c.removed)
            .unwrap_or(false)
    }

    /// 削除されていないコンテナ数
    pub fn live_containers(&self) -> usize {
        self.state()
            .containers
            .values()
            .filter(|c| !c.removed)
            .count()
    }

    pub fn built_images(&self) -> Vec<String> {
        self.state().built_images.clone()
    }

    pub fn removed_images(&self) -> Vec<String> {
        self.state().removed_images.clone()
    }

    fn host_port_for(&self, container_port: u16, configured: Option<u16>) -> u16 {
        self.host_ports
            .get(&container_port)
            .copied()
            .or(configured)
            .unwrap_or(container_port)
    }
}

fn fake_id(n: u32) -> String {
    format!("{:0>64}", format!("fake{}", n))
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        let mut state = self.state();
        state.run_count += 1;

        if self.fail_run {
            return Err(ContainerError::ImageNotFound {
                image: config.image.clone(),
            });
        }

        state.next_id += 1;
        let id = fake_id(state.next_id);
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("fake-{}", state.next_id));

        state.containers.insert(
            id.clone(),
            FakeContainer {
                name,
                config: config.clone(),
                removed: false,
                inspections: 0,
            },
        );

        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        if self.fail_start {
            return Err(ContainerError::DockerApiError(format!(
                "コンテナ {} を起動できません: port is already allocated",
                id
            )));
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool, _delete_volumes: bool) -> Result<()> {
        let mut state = self.state();
        state.remove_count += 1;

        match state.containers.get_mut(id) {
            Some(container) if !container.removed => {
                container.removed = true;
                Ok(())
            }
            _ => Err(ContainerError::DockerApiError(format!(
                "No such container: {}",
                id
            ))),
        }
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        let mut state = self.state();
        state.inspect_count += 1;

        let container = state
            .containers
            .get_mut(id)
            .filter(|c| !c.removed)
            .ok_or_else(|| ContainerError::DockerApiError(format!("No such container: {}", id)))?;
        container.inspections += 1;

        let assigned = container.inspections > self.ports_after_inspections;
        let ports = container
            .config
            .ports
            .iter()
            .map(|(port, configured)| {
                let bindings = if assigned {
                    vec![HostBinding {
                        host_ip: "0.0.0.0".to_string(),
                        host_port: self.host_port_for(*port, *configured).to_string(),
                    }]
                } else {
                    Vec::new()
                };
                (tcp_port_key(*port), bindings)
            })
            .collect();

        Ok(ContainerDetails {
            name: container.name.clone(),
            running: true,
            ports,
            bridge_ip: self.bridge_ip.clone(),
        })
    }

    async fn wait_container(&self, _id: &str) -> Result<i64> {
        self.state().wait_count += 1;
        Ok(self.exit_code)
    }

    fn logs<'a>(&'a self, _id: &'a str) -> BoxStream<'a, Result<LogLine>> {
        let lines: Vec<Result<LogLine>> = self
            .logs
            .iter()
            .map(|message| {
                Ok(LogLine {
                    stream: LogStream::StdOut,
                    message: message.clone(),
                })
            })
            .collect();
        stream::iter(lines).boxed()
    }

    async fn exec(&self, _id: &str, command: Vec<String>) -> Result<ExecOutput> {
        let mut state = self.state();
        state.exec_count += 1;
        state.last_exec = Some(command);
        Ok(self.exec_output.clone())
    }

    async fn build_image(&self, _context: Vec<u8>, tag: &str) -> Result<String> {
        if self.fail_build {
            return Err(ContainerError::DockerApiError(
                "ビルドに失敗しました: fake failure".to_string(),
            ));
        }

        let mut state = self.state();
        state.built_images.push(tag.to_string());
        Ok(format!("sha256:{}", state.built_images.len()))
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        self.state().removed_images.push(image.to_string());
        Ok(())
    }
}
