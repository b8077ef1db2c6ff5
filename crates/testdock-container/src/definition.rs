//! 起動するコンテナの定義

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ContainerError;

/// ボリュームのマウントモード
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VolumeMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

impl VolumeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            VolumeMode::ReadOnly => "ro",
            VolumeMode::ReadWrite => "rw",
        }
    }
}

impl fmt::Display for VolumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolumeMode {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ro" => Ok(VolumeMode::ReadOnly),
            "rw" => Ok(VolumeMode::ReadWrite),
            other => Err(ContainerError::ConfigError(format!(
                "不正なボリュームモード: '{}'（ro または rw）",
                other
            ))),
        }
    }
}

/// ホストパスに対するマウント先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub container_path: String,
    pub mode: VolumeMode,
}

/// コンテナの起動設定
///
/// 起動前に [`ContainerHandle`](crate::ContainerHandle) の `with_*` 系メソッドで
/// 組み立てる。起動後に変更しても実行中のコンテナには反映されない。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    pub image: String,
    pub command: Option<String>,
    pub network: Option<String>,
    pub name: Option<String>,
    pub env: HashMap<String, String>,
    /// コンテナポート → ホストポート（`None` はランタイムに任せる）
    pub ports: HashMap<u16, Option<u16>>,
    /// ホストパス → マウント先
    pub volumes: HashMap<String, VolumeMount>,
    /// エイリアス → リンク先コンテナ
    pub links: HashMap<String, String>,
}

impl ContainerConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// ホストポートを指定せずに公開する。既にバインド済みなら何もしない
    pub fn expose_port(&mut self, port: u16) {
        self.ports.entry(port).or_insert(None);
    }

    pub fn bind_port(&mut self, container_port: u16, host_port: Option<u16>) {
        self.ports.insert(container_port, host_port);
    }

    pub fn add_volume(
        &mut self,
        host_path: impl Into<String>,
        container_path: impl Into<String>,
        mode: VolumeMode,
    ) {
        self.volumes.insert(
            host_path.into(),
            VolumeMount {
                container_path: container_path.into(),
                mode,
            },
        );
    }

    pub fn add_link(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.links.insert(alias.into(), target.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_mode_parse() {
        assert_eq!("ro".parse::<VolumeMode>().unwrap(), VolumeMode::ReadOnly);
        assert_eq!("rw".parse::<VolumeMode>().unwrap(), VolumeMode::ReadWrite);
        assert!("rx".parse::<VolumeMode>().is_err());
        assert_eq!(VolumeMode::default(), VolumeMode::ReadOnly);
    }

    #[test]
    fn test_new_config_is_empty() {
        let config = ContainerConfig::new("alpine:3");
        assert_eq!(config.image, "alpine:3");
        assert!(config.env.is_empty());
        assert!(config.ports.is_empty());
        assert!(config.command.is_none());
    }

    #[test]
    fn test_expose_port_keeps_existing_binding() {
        let mut config = ContainerConfig::new("postgres");
        config.bind_port(5432, Some(15432));
        config.expose_port(5432);
        config.expose_port(6432);

        assert_eq!(config.ports.get(&5432), Some(&Some(15432)));
        assert_eq!(config.ports.get(&6432), Some(&None));
    }

    #[test]
    fn test_volume_and_link() {
        let mut config = ContainerConfig::new("app");
        config.add_volume("/srv", "/data", VolumeMode::ReadWrite);
        config.add_link("db", "pg-1");

        assert_eq!(config.volumes["/srv"].container_path, "/data");
        assert_eq!(config.volumes["/srv"].mode, VolumeMode::ReadWrite);
        assert_eq!(config.links["db"], "pg-1");
    }
}
