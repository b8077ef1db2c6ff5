use crate::error::Result;
use crate::definition::ContainerConfig;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// コンテナランタイムのトレイト
///
/// Docker デーモンのリモート API のうち、このクレートが使う操作だけを抽象化する。
/// 本番では [`DockerRuntime`](crate::DockerRuntime)、テストでは
/// `testing::FakeRuntime` を使う。
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// コンテナを作成し、コンテナIDを返す（起動はしない）
    async fn create_container(&self, config: &ContainerConfig) -> Result<String>;

    /// 作成済みのコンテナを起動する
    async fn start_container(&self, id: &str) -> Result<()>;

    /// コンテナを作成してデタッチ状態で起動する
    ///
    /// 起動に失敗した場合は作成済みのコンテナを削除してからエラーを返す。
    /// 割り当てられたコンテナ名は inspect で取得する。
    async fn run_container(&self, config: &ContainerConfig) -> Result<ContainerIdentity> {
        let id = self.create_container(config).await?;

        if let Err(e) = self.start_container(&id).await {
            if let Err(remove_err) = self.remove_container(&id, true, true).await {
                debug!(
                    "Failed to remove container {} after start failure: {}",
                    id, remove_err
                );
            }
            return Err(e);
        }

        Ok(ContainerIdentity::new(id, config.name.clone().unwrap_or_default()))
    }

    /// コンテナを削除する
    async fn remove_container(&self, id: &str, force: bool, delete_volumes: bool) -> Result<()>;

    /// コンテナの現在の状態を取得する
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails>;

    /// コンテナの終了を待ち、終了コードを返す
    async fn wait_container(&self, id: &str) -> Result<i64>;

    /// コンテナのログをストリームで取得する
    fn logs<'a>(&'a self, id: &'a str) -> BoxStream<'a, Result<LogLine>>;

    /// コンテナ内でコマンドを実行する
    async fn exec(&self, id: &str, command: Vec<String>) -> Result<ExecOutput>;

    /// tar.gz 形式のビルドコンテキストからイメージをビルドし、イメージIDを返す
    async fn build_image(&self, context: Vec<u8>, tag: &str) -> Result<String>;

    /// イメージを削除する
    async fn remove_image(&self, image: &str) -> Result<()>;
}

/// ランタイムが割り当てたコンテナの識別情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerIdentity {
    pub id: String,
    pub name: String,
}

impl ContainerIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// 先頭12文字の短縮ID
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

/// ホスト側のポートバインディング
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostBinding {
    /// 空文字列は全インターフェースを意味する
    pub host_ip: String,
    pub host_port: String,
}

/// inspect で取得したコンテナの状態
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContainerDetails {
    pub name: String,
    pub running: bool,
    /// `"5432/tcp"` 形式のキーごとのバインディング
    pub ports: HashMap<String, Vec<HostBinding>>,
    /// デフォルトの bridge ネットワーク上のIPアドレス
    pub bridge_ip: Option<String>,
}

impl ContainerDetails {
    /// 指定した TCP ポートの最初のバインディング
    pub fn tcp_binding(&self, port: u16) -> Option<&HostBinding> {
        self.ports
            .get(&tcp_port_key(port))
            .and_then(|bindings| bindings.first())
    }
}

/// ポートマップのキー
pub fn tcp_port_key(port: u16) -> String {
    format!("{}/tcp", port)
}

/// コマンド実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: Option<i64>,
    pub output: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// ログの出力元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    StdOut,
    StdErr,
    Console,
}

/// ログの1チャンク
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: LogStream,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        let identity = ContainerIdentity::new("0123456789abcdef0123", "pg");
        assert_eq!(identity.short_id(), "0123456789ab");

        let identity = ContainerIdentity::new("abc", "pg");
        assert_eq!(identity.short_id(), "abc");
    }

    #[test]
    fn test_tcp_binding_lookup() {
        let mut details = ContainerDetails::default();
        details.ports.insert(
            "5432/tcp".to_string(),
            vec![
                HostBinding {
                    host_ip: "0.0.0.0".to_string(),
                    host_port: "49153".to_string(),
                },
                HostBinding {
                    host_ip: "::".to_string(),
                    host_port: "49153".to_string(),
                },
            ],
        );
        details.ports.insert("6379/tcp".to_string(), vec![]);

        assert_eq!(details.tcp_binding(5432).unwrap().host_ip, "0.0.0.0");
        assert!(details.tcp_binding(6379).is_none());
        assert!(details.tcp_binding(80).is_none());
    }

    #[test]
    fn test_exec_output() {
        let output = ExecOutput {
            exit_code: Some(0),
            output: b"hello\n".to_vec(),
        };
        assert!(output.success());
        assert_eq!(output.output_lossy(), "hello\n");

        let output = ExecOutput {
            exit_code: Some(1),
            output: vec![],
        };
        assert!(!output.success());
    }
}
