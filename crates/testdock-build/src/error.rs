use std::path::PathBuf;
use testdock_container::ContainerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error(transparent)]
    Runtime(#[from] ContainerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     ビルドディレクトリ直下に Dockerfile を置いてください。",
                    path.display()
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileの内容を確認してください。",
                    msg
                )
            }
            BuildError::ContextNotFound(path) => {
                format!(
                    "ビルドコンテキストが見つかりません: {}\n\
                     \n\
                     パスを確認してください。",
                    path.display()
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_mentions_path() {
        let err = BuildError::DockerfileNotFound(PathBuf::from("/tmp/app/Dockerfile"));
        assert!(err.user_message().contains("/tmp/app/Dockerfile"));

        let err = BuildError::Runtime(ContainerError::NotStarted);
        assert_eq!(err.user_message(), ContainerError::NotStarted.to_string());
    }
}
