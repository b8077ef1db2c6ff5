//! bollard による ContainerRuntime 実装

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::converter::{parse_image_tag, to_container_config};
use crate::definition::ContainerConfig;
use crate::error::{ContainerError, Result};
use crate::runtime::{
    ContainerDetails, ContainerRuntime, ExecOutput, HostBinding, LogLine, LogStream,
};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use futures_util::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use tracing::{debug, info};

/// Docker デーモンに接続するランタイム
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// ローカルのデフォルト設定（`DOCKER_HOST` など）で接続し、疎通を確認する
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;

        // 接続テスト
        docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;

        Ok(Self { docker })
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// イメージの存在確認
    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Dockerイメージをpull
    pub async fn pull_image(&self, image: &str) -> Result<()> {
        let (image_name, tag) = parse_image_tag(image);
        debug!("Pulling image {}", image);

        let options = bollard::image::CreateImageOptions {
            from_image: image_name,
            tag,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(info) = stream.next().await {
            match info {
                Ok(bollard::models::CreateImageInfo {
                    status: Some(status),
                    ..
                }) => {
                    debug!("  {}: {}", image, status);
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        let (container_config, options) = to_container_config(config)?;

        if !self.image_exists(&config.image).await? {
            self.pull_image(&config.image).await?;
        }

        let response = self
            .docker
            .create_container(options, container_config)
            .await?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<bollard::query_parameters::StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool, delete_volumes: bool) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(bollard::query_parameters::RemoveContainerOptions {
                    force,
                    v: delete_volumes,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        let info = self
            .docker
            .inspect_container(
                id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await?;

        let running = info
            .state
            .as_ref()
            .and_then(|state| state.running)
            .unwrap_or(false);

        let mut ports = HashMap::new();
        let mut bridge_ip = None;

        if let Some(settings) = info.network_settings {
            for (key, bindings) in settings.ports.unwrap_or_default() {
                let bindings = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| HostBinding {
                        host_ip: b.host_ip.unwrap_or_default(),
                        host_port: b.host_port.unwrap_or_default(),
                    })
                    .collect();
                ports.insert(key, bindings);
            }

            bridge_ip = settings
                .networks
                .as_ref()
                .and_then(|networks| networks.get("bridge"))
                .and_then(|endpoint| endpoint.ip_address.clone())
                .filter(|ip| !ip.is_empty());
        }

        Ok(ContainerDetails {
            // Docker はコンテナ名を "/name" 形式で返す
            name: info
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            running,
            ports,
            bridge_ip,
        })
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let mut stream = self
            .docker
            .wait_container(id, None::<bollard::query_parameters::WaitContainerOptions>);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // 非ゼロ終了はエラーとして通知される
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(ContainerError::DockerApiError(format!(
                "コンテナ '{}' の終了を取得できませんでした",
                id
            ))),
        }
    }

    fn logs<'a>(&'a self, id: &'a str) -> BoxStream<'a, Result<LogLine>> {
        let options = bollard::container::LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        self.docker
            .logs(id, Some(options))
            .filter_map(|item| async move {
                match item {
                    Ok(LogOutput::StdOut { message }) => Some(Ok(LogLine {
                        stream: LogStream::StdOut,
                        message: String::from_utf8_lossy(&message).into_owned(),
                    })),
                    Ok(LogOutput::StdErr { message }) => Some(Ok(LogLine {
                        stream: LogStream::StdErr,
                        message: String::from_utf8_lossy(&message).into_owned(),
                    })),
                    Ok(LogOutput::Console { message }) => Some(Ok(LogLine {
                        stream: LogStream::Console,
                        message: String::from_utf8_lossy(&message).into_owned(),
                    })),
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(e.into())),
                }
            })
            .boxed()
    }

    async fn exec(&self, id: &str, command: Vec<String>) -> Result<ExecOutput> {
        let exec_config = CreateExecOptions {
            cmd: Some(command),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let message = self.docker.create_exec(id, exec_config).await?;

        let mut output = Vec::new();
        match self
            .docker
            .start_exec(&message.id, Some(StartExecOptions::default()))
            .await?
        {
            StartExecResults::Attached {
                output: mut stream, ..
            } => {
                while let Some(chunk) = stream.next().await {
                    match chunk? {
                        LogOutput::StdOut { message }
                        | LogOutput::StdErr { message }
                        | LogOutput::Console { message } => output.extend_from_slice(&message),
                        LogOutput::StdIn { .. } => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(ContainerError::ExecFailed(
                    "出力を取得できません（デタッチモード）".to_string(),
                ));
            }
        }

        let inspect = self.docker.inspect_exec(&message.id).await?;
        Ok(ExecOutput {
            exit_code: inspect.exit_code,
            output,
        })
    }

    async fn build_image(&self, context: Vec<u8>, tag: &str) -> Result<String> {
        info!("Building image: {}", tag);

        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            ..Default::default()
        };

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            let output = msg?;

            if let Some(line) = output.stream {
                debug!("{}", line.trim_end());
            }

            if let Some(error) = output.error {
                return Err(ContainerError::DockerApiError(format!(
                    "ビルドに失敗しました: {}",
                    error
                )));
            }

            if let Some(error_detail) = output.error_detail {
                let error_msg = error_detail
                    .message
                    .unwrap_or_else(|| "Unknown build error".to_string());
                return Err(ContainerError::DockerApiError(format!(
                    "ビルドに失敗しました: {}",
                    error_msg
                )));
            }
        }

        let image = self.docker.inspect_image(tag).await?;
        let id = image.id.unwrap_or_else(|| tag.to_string());
        info!("Successfully built: {} ({})", tag, id);
        Ok(id)
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        self.docker
            .remove_image(
                image,
                Some(bollard::query_parameters::RemoveImageOptions {
                    force: true,
                    ..Default::default()
                }),
                None,
            )
            .await?;
        Ok(())
    }
}
