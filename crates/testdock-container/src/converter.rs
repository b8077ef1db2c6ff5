//! ContainerConfig から Docker API パラメータへの変換

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::definition::ContainerConfig;
use crate::error::{ContainerError, Result};
use crate::runtime::tcp_port_key;
use bollard::container::{Config, CreateContainerOptions};
use bollard::models::{HostConfig, PortBinding};
use std::collections::HashMap;

/// testdock が作成したコンテナに付与するラベル
pub const MANAGED_LABEL: &str = "testdock.managed";

/// ContainerConfig を Docker のコンテナ設定に変換
///
/// コマンドの引用符が閉じていない場合は `ConfigError`。
pub fn to_container_config(
    config: &ContainerConfig,
) -> Result<(Config<String>, Option<CreateContainerOptions<String>>)> {
    let cmd = config.command.as_deref().map(split_command).transpose()?;

    // 環境変数の設定
    let mut env: Vec<String> = config
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    env.sort();

    // ポートバインディングの設定
    let mut port_bindings = HashMap::new();
    let mut exposed_ports = HashMap::new();

    for (container_port, host_port) in &config.ports {
        let key = tcp_port_key(*container_port);

        exposed_ports.insert(key.clone(), HashMap::new());

        // ホストポート未指定の場合は空文字列でランタイムに割り当てを任せる
        port_bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(host_port.map(|p| p.to_string()).unwrap_or_default()),
            }]),
        );
    }

    // ボリュームバインディング
    let mut binds: Vec<String> = config
        .volumes
        .iter()
        .map(|(host, mount)| format!("{}:{}:{}", host, mount.container_path, mount.mode))
        .collect();
    binds.sort();

    // リンク（"コンテナ:エイリアス" 形式）
    let mut links: Vec<String> = config
        .links
        .iter()
        .map(|(alias, target)| format!("{}:{}", target, alias))
        .collect();
    links.sort();

    let host_config = Some(HostConfig {
        port_bindings: Some(port_bindings),
        binds: if binds.is_empty() { None } else { Some(binds) },
        links: if links.is_empty() { None } else { Some(links) },
        network_mode: config.network.clone(),
        ..Default::default()
    });

    let mut labels = HashMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

    let container_config = Config {
        image: Some(config.image.clone()),
        env: Some(env),
        exposed_ports: Some(exposed_ports),
        host_config,
        labels: Some(labels),
        cmd,
        ..Default::default()
    };

    let options = config.name.as_ref().map(|name| CreateContainerOptions {
        name: name.clone(),
        platform: None,
    });

    Ok((container_config, options))
}

/// シェルの引用規則に従ってコマンド文字列を引数に分割
pub fn split_command(command: &str) -> Result<Vec<String>> {
    shlex::split(command).ok_or_else(|| {
        ContainerError::ConfigError(format!("コマンドの引用符が閉じていません: {}", command))
    })
}

/// "name:tag" をイメージ名とタグに分離
/// 例: "postgres:11-alpine" -> ("postgres", "11-alpine")
///     "localhost:5000/app" -> ("localhost:5000/app", "latest")
pub fn parse_image_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{VolumeMode, VolumeMount};

    #[test]
    fn test_basic_config() {
        let config = ContainerConfig::new("postgres:11-alpine");

        let (docker_config, options) = to_container_config(&config).unwrap();

        assert_eq!(docker_config.image, Some("postgres:11-alpine".to_string()));
        assert!(docker_config.cmd.is_none());
        assert!(options.is_none());
        assert_eq!(
            docker_config.labels.unwrap().get(MANAGED_LABEL),
            Some(&"true".to_string())
        );
    }

    #[test]
    fn test_environment() {
        let mut config = ContainerConfig::new("postgres");
        config
            .env
            .insert("POSTGRES_USER".to_string(), "user".to_string());
        config
            .env
            .insert("POSTGRES_DB".to_string(), "user".to_string());

        let (docker_config, _) = to_container_config(&config).unwrap();

        assert_eq!(
            docker_config.env.unwrap(),
            vec![
                "POSTGRES_DB=user".to_string(),
                "POSTGRES_USER=user".to_string()
            ]
        );
    }

    #[test]
    fn test_ports() {
        let mut config = ContainerConfig::new("rabbitmq");
        config.ports.insert(5672, None);
        config.ports.insert(15672, Some(15672));

        let (docker_config, _) = to_container_config(&config).unwrap();

        let exposed = docker_config.exposed_ports.unwrap();
        assert!(exposed.contains_key("5672/tcp"));
        assert!(exposed.contains_key("15672/tcp"));

        let bindings = docker_config.host_config.unwrap().port_bindings.unwrap();
        let ephemeral = bindings.get("5672/tcp").unwrap().as_ref().unwrap();
        assert_eq!(ephemeral[0].host_port, Some(String::new()));
        let fixed = bindings.get("15672/tcp").unwrap().as_ref().unwrap();
        assert_eq!(fixed[0].host_port, Some("15672".to_string()));
    }

    #[test]
    fn test_volumes_links_network_and_name() {
        let mut config = ContainerConfig::new("app");
        config.volumes.insert(
            "/srv/data".to_string(),
            VolumeMount {
                container_path: "/data".to_string(),
                mode: VolumeMode::ReadOnly,
            },
        );
        config.volumes.insert(
            "/srv/cache".to_string(),
            VolumeMount {
                container_path: "/cache".to_string(),
                mode: VolumeMode::ReadWrite,
            },
        );
        config.links.insert("db".to_string(), "pg-1".to_string());
        config.network = Some("integration".to_string());
        config.name = Some("app-under-test".to_string());
        config.command = Some("sleep  infinity".to_string());

        let (docker_config, options) = to_container_config(&config).unwrap();

        let host_config = docker_config.host_config.unwrap();
        assert_eq!(
            host_config.binds.unwrap(),
            vec![
                "/srv/cache:/cache:rw".to_string(),
                "/srv/data:/data:ro".to_string()
            ]
        );
        assert_eq!(host_config.links.unwrap(), vec!["pg-1:db".to_string()]);
        assert_eq!(host_config.network_mode, Some("integration".to_string()));
        assert_eq!(
            docker_config.cmd,
            Some(vec!["sleep".to_string(), "infinity".to_string()])
        );
        assert_eq!(options.unwrap().name, "app-under-test");
    }

    #[test]
    fn test_quoted_command_kept_as_one_argument() {
        let mut config = ContainerConfig::new("alpine:3");
        config.command = Some("sh -c 'echo hi && sleep 10'".to_string());

        let (docker_config, _) = to_container_config(&config).unwrap();

        assert_eq!(
            docker_config.cmd,
            Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo hi && sleep 10".to_string()
            ])
        );
    }

    #[test]
    fn test_empty_quoted_argument() {
        assert_eq!(
            split_command("redis-server --save ''").unwrap(),
            vec![
                "redis-server".to_string(),
                "--save".to_string(),
                String::new()
            ]
        );
    }

    #[test]
    fn test_unbalanced_quotes_rejected() {
        let mut config = ContainerConfig::new("alpine:3");
        config.command = Some("sh -c 'echo hi".to_string());

        let result = to_container_config(&config);

        assert!(matches!(result, Err(ContainerError::ConfigError(_))));
    }

    #[test]
    fn test_parse_image_tag() {
        assert_eq!(parse_image_tag("redis:7-alpine"), ("redis", "7-alpine"));
        assert_eq!(parse_image_tag("postgres"), ("postgres", "latest"));
        assert_eq!(
            parse_image_tag("localhost:5000/app"),
            ("localhost:5000/app", "latest")
        );
        assert_eq!(
            parse_image_tag("localhost:5000/app:1.2"),
            ("localhost:5000/app", "1.2")
        );
    }
}
