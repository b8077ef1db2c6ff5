use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • DOCKER_HOST の設定を確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("コンテナはまだ起動していません")]
    NotStarted,

    #[error("コンテナは既に起動済みです（停止したハンドルは再起動できません）")]
    AlreadyStarted,

    #[error(
        "イメージ '{image}' が見つかりません\n\nヒント:\n  • イメージ名とタグを確認してください\n  • docker pull {image} でイメージをダウンロードしてください"
    )]
    ImageNotFound { image: String },

    #[error(
        "ポート {port}/tcp のホスト側ポートが割り当てられませんでした（{attempts}回確認）\n\nヒント:\n  • with_exposed_ports / with_bind_port でポートを公開しているか確認してください"
    )]
    PortNotExposed { port: u16, attempts: u32 },

    #[error("準備完了の待機がタイムアウトしました（{attempts}回試行）{}", last_cause_suffix(.last_cause))]
    ReadinessTimeout {
        attempts: u32,
        last_cause: Option<String>,
    },

    #[error("コマンドの実行に失敗しました: {0}")]
    ExecFailed(String),

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error("設定エラー: {0}")]
    ConfigError(String),
}

fn last_cause_suffix(cause: &Option<String>) -> String {
    match cause {
        Some(cause) => format!(": 最後のエラー: {}", cause),
        None => String::new(),
    }
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } if message.contains("No such image") => {
                // メッセージ形式: "No such image: postgres:11-alpine"
                let image = message
                    .split_once(": ")
                    .map(|(_, image)| image.to_string())
                    .unwrap_or_else(|| message.clone());
                ContainerError::ImageNotFound { image }
            }
            bollard::errors::Error::DockerResponseServerError { .. } => {
                ContainerError::DockerApiError(err.to_string())
            }
            _ => {
                // 接続エラーの可能性をチェック
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
