//! 準備完了待機モジュール
//!
//! 呼び出し元が渡すプローブ関数を、成功するか試行回数の上限に達するまで
//! 一定間隔で繰り返し実行する。
//!
//! プローブの判定方針は一つに統一している:
//! `Err` を返した場合は「まだ準備できていない」とみなしてリトライし、
//! そのエラー内容を最後の失敗原因として保持する。`Ok(())` で準備完了。

use crate::error::{ContainerError, Result};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// 待機設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl WaitConfig {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// プローブが成功するまで待機
///
/// # Returns
/// * `Ok(())` - プローブが一度成功した
/// * `Err(ContainerError::ReadinessTimeout)` - `max_attempts` 回すべて失敗
pub async fn wait_until_ready<F, Fut, E>(config: &WaitConfig, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: Display,
{
    debug!("Waiting to be ready (max {} attempts)", config.max_attempts);

    let mut last_cause = None;

    for attempt in 0..config.max_attempts {
        match probe().await {
            Ok(()) => {
                debug!("Ready after {} attempt(s)", attempt + 1);
                return Ok(());
            }
            Err(e) => {
                trace!("Not ready yet (attempt {}): {}", attempt + 1, e);
                last_cause = Some(e.to_string());
            }
        }

        // 最後の試行でなければ待機
        if attempt + 1 < config.max_attempts {
            sleep(config.interval).await;
        }
    }

    Err(ContainerError::ReadinessTimeout {
        attempts: config.max_attempts,
        last_cause,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn counting_probe(
        succeed_on: u32,
    ) -> (
        Arc<AtomicU32>,
        impl FnMut() -> std::future::Ready<std::result::Result<(), String>>,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let probe = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= succeed_on {
                std::future::ready(Ok(()))
            } else {
                std::future::ready(Err(format!("attempt {} refused", n)))
            }
        };
        (calls, probe)
    }

    #[test]
    fn test_default_config() {
        let config = WaitConfig::default();
        assert_eq!(config.max_attempts, 1000);
        assert_eq!(config.interval, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_kth_attempt_with_k_minus_one_sleeps() {
        let config = WaitConfig::new(10, Duration::from_millis(100));
        let (calls, probe) = counting_probe(4);

        let started = Instant::now();
        wait_until_ready(&config, probe).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_does_not_sleep() {
        let config = WaitConfig::new(10, Duration::from_secs(1));
        let (calls, probe) = counting_probe(1);

        let started = Instant::now();
        wait_until_ready(&config, probe).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_exactly_max_attempts() {
        let config = WaitConfig::new(5, Duration::from_millis(100));
        let (calls, probe) = counting_probe(u32::MAX);

        let err = wait_until_ready(&config, probe).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match err {
            ContainerError::ReadinessTimeout {
                attempts,
                last_cause,
            } => {
                assert_eq!(attempts, 5);
                assert_eq!(last_cause.as_deref(), Some("attempt 5 refused"));
            }
            other => panic!("Expected ReadinessTimeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_last_attempt() {
        let config = WaitConfig::new(3, Duration::from_millis(100));
        let (calls, probe) = counting_probe(3);

        let started = Instant::now();
        wait_until_ready(&config, probe).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_zero_attempts_never_calls_probe() {
        let config = WaitConfig::new(0, Duration::from_millis(100));
        let (calls, probe) = counting_probe(1);

        let err = wait_until_ready(&config, probe).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            err,
            ContainerError::ReadinessTimeout {
                attempts: 0,
                last_cause: None
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_probe_is_awaited() {
        let config = WaitConfig::new(10, Duration::from_millis(50));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        wait_until_ready(&config, move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if counter.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "refused",
                    ))
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
