//! 環境変数からの設定読み込み
//!
//! | 変数 | 内容 |
//! |---|---|
//! | `TESTDOCK_INSIDE_CONTAINER` | コンテナ内判定の上書き（`1`/`true`/`yes` または `0`/`false`/`no`） |
//! | `TESTDOCK_READY_MAX_ATTEMPTS` | サービス準備完了待機の最大試行回数 |
//! | `TESTDOCK_READY_INTERVAL_MS` | サービス準備完了待機の試行間隔（ミリ秒） |
//! | `TESTDOCK_PORT_RESOLVE_ATTEMPTS` | ホスト側ポート解決の最大試行回数 |

use crate::error::{ContainerError, Result};
use crate::waiter::WaitConfig;
use std::time::Duration;

pub const ENV_INSIDE_CONTAINER: &str = "TESTDOCK_INSIDE_CONTAINER";
pub const ENV_READY_MAX_ATTEMPTS: &str = "TESTDOCK_READY_MAX_ATTEMPTS";
pub const ENV_READY_INTERVAL_MS: &str = "TESTDOCK_READY_INTERVAL_MS";
pub const ENV_PORT_RESOLVE_ATTEMPTS: &str = "TESTDOCK_PORT_RESOLVE_ATTEMPTS";

/// ホスト側ポート解決のデフォルト試行回数
pub const DEFAULT_PORT_RESOLVE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// `None` の場合はマーカーファイルで判定する
    pub inside_container: Option<bool>,
    pub readiness: WaitConfig,
    pub port_resolve_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inside_container: None,
            readiness: WaitConfig::default(),
            port_resolve_attempts: DEFAULT_PORT_RESOLVE_ATTEMPTS,
        }
    }
}

impl Settings {
    /// 環境変数から設定を読み込む
    ///
    /// 値が不正な場合はリトライせず即座に `ConfigError` を返す。
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Some(value) = read_var(ENV_INSIDE_CONTAINER) {
            settings.inside_container = Some(parse_bool(ENV_INSIDE_CONTAINER, &value)?);
        }

        if let Some(value) = read_var(ENV_READY_MAX_ATTEMPTS) {
            settings.readiness.max_attempts = parse_u32(ENV_READY_MAX_ATTEMPTS, &value)?;
        }

        if let Some(value) = read_var(ENV_READY_INTERVAL_MS) {
            let millis = parse_u32(ENV_READY_INTERVAL_MS, &value)?;
            settings.readiness.interval = Duration::from_millis(u64::from(millis));
        }

        if let Some(value) = read_var(ENV_PORT_RESOLVE_ATTEMPTS) {
            let attempts = parse_u32(ENV_PORT_RESOLVE_ATTEMPTS, &value)?;
            if attempts == 0 {
                return Err(ContainerError::ConfigError(format!(
                    "{} は1以上を指定してください",
                    ENV_PORT_RESOLVE_ATTEMPTS
                )));
            }
            settings.port_resolve_attempts = attempts;
        }

        Ok(settings)
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ContainerError::ConfigError(format!(
            "{} の値が不正です: '{}'",
            name, value
        ))),
    }
}

fn parse_u32(name: &str, value: &str) -> Result<u32> {
    value.parse::<u32>().map_err(|e| {
        ContainerError::ConfigError(format!("{} の値が不正です: '{}' ({})", name, value, e))
    })
}
