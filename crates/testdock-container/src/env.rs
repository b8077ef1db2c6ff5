//! 実行環境の判定
//!
//! 呼び出し元プロセス自体がコンテナ内で動いているかどうかで、
//! 接続先のアドレス・ポートの解決方法が変わる。

use crate::config::Settings;
use crate::error::Result;
use std::path::Path;

/// Docker がコンテナ内に配置するマーカーファイル
pub const DOCKER_ENV_MARKER: &str = "/.dockerenv";

/// 呼び出し元がコンテナ内で動作しているか
pub fn inside_container() -> bool {
    inside_container_at(Path::new(DOCKER_ENV_MARKER))
}

/// 任意のマーカーファイルでコンテナ内判定を行う
pub fn inside_container_at(marker: &Path) -> bool {
    marker.exists()
}

/// 呼び出し元プロセスの配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// ホスト上。ホストに公開されたポート経由で接続する
    Host,
    /// 別コンテナ内。同一ネットワーク上のコンテナポートへ直接接続する
    Container,
}

impl Placement {
    /// 設定による上書きを優先し、なければマーカーファイルで判定
    ///
    /// 環境変数の値が不正な場合は `ConfigError`。
    pub fn detect() -> Result<Self> {
        let inside = Settings::from_env()?
            .inside_container
            .unwrap_or_else(inside_container);
        Ok(Self::from_inside(inside))
    }

    pub fn from_inside(inside: bool) -> Self {
        if inside {
            Placement::Container
        } else {
            Placement::Host
        }
    }

    pub fn is_inside_container(self) -> bool {
        self == Placement::Container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_INSIDE_CONTAINER;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_marker_presence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let marker = temp_dir.path().join(".dockerenv");

        assert!(!inside_container_at(&marker));

        fs::write(&marker, "").unwrap();
        assert!(inside_container_at(&marker));
    }

    #[test]
    #[serial]
    fn test_detect_respects_override() {
        temp_env::with_var(ENV_INSIDE_CONTAINER, Some("true"), || {
            assert_eq!(Placement::detect().unwrap(), Placement::Container);
        });

        temp_env::with_var(ENV_INSIDE_CONTAINER, Some("false"), || {
            assert_eq!(Placement::detect().unwrap(), Placement::Host);
        });
    }

    #[test]
    #[serial]
    fn test_detect_falls_back_to_marker() {
        temp_env::with_var_unset(ENV_INSIDE_CONTAINER, || {
            assert_eq!(
                Placement::detect().unwrap(),
                Placement::from_inside(inside_container())
            );
        });
    }

    #[test]
    #[serial]
    fn test_detect_rejects_invalid_override() {
        temp_env::with_var(ENV_INSIDE_CONTAINER, Some("maybe"), || {
            assert!(matches!(
                Placement::detect(),
                Err(crate::error::ContainerError::ConfigError(_))
            ));
        });
    }
}
