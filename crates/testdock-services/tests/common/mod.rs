use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testdock_container::WaitConfig;

/// 短い間隔の待機設定
pub fn quick_readiness(max_attempts: u32) -> WaitConfig {
    WaitConfig::new(max_attempts, Duration::from_millis(10))
}

/// 呼び出し回数と受け取ったURLを記録する接続確認
#[derive(Clone, Default)]
pub struct ProbeRecorder {
    calls: Arc<AtomicU32>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl ProbeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `succeed_after` 回目の呼び出しから成功する接続確認
    pub fn probe(
        &self,
        succeed_after: u32,
    ) -> impl Fn(String) -> std::future::Ready<Result<(), String>> + Send + Sync + 'static {
        let calls = self.calls.clone();
        let urls = self.urls.clone();
        move |url: String| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            urls.lock().unwrap().push(url);
            if n >= succeed_after {
                std::future::ready(Ok(()))
            } else {
                std::future::ready(Err(format!("connection refused ({})", n)))
            }
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}
