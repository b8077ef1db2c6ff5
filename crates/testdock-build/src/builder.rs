use crate::context::ContextBuilder;
use crate::error::{BuildError, BuildResult};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use testdock_container::{ContainerError, ContainerRuntime};

/// ビルドしたイメージに付けるタグのリポジトリ名
pub const BUILD_TAG_REPOSITORY: &str = "testdock-build";

/// ディレクトリからイメージをビルドし、使い終わったら削除する
///
/// 削除は [`BuildContext::remove`] か [`BuildContext::run_scoped`] で行う。
/// Drop 時にも削除を試みるが、ベストエフォートでエラーは無視される。
pub struct BuildContext {
    runtime: Arc<dyn ContainerRuntime>,
    path: PathBuf,
    image_id: Option<String>,
}

impl BuildContext {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, path: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            path: path.into(),
            image_id: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ビルド済みならイメージID
    pub fn image_id(&self) -> Option<&str> {
        self.image_id.as_deref()
    }

    /// イメージをビルドしてIDを返す。ビルド済みなら既存のIDを返す
    pub async fn build(&mut self) -> BuildResult<&str> {
        if self.image_id.is_none() {
            let context_data = ContextBuilder::create_context(&self.path)?;
            let tag = format!(
                "{}:{}",
                BUILD_TAG_REPOSITORY,
                uuid::Uuid::new_v4().simple()
            );

            tracing::info!("Building image from {} as {}", self.path.display(), tag);
            let id = self
                .runtime
                .build_image(context_data, &tag)
                .await
                .map_err(|e| match e {
                    ContainerError::DockerApiError(msg) => BuildError::BuildFailed(msg),
                    other => BuildError::Runtime(other),
                })?;

            self.image_id = Some(id);
        }

        Ok(self.image_id.as_deref().unwrap_or_default())
    }

    /// ビルドしたイメージを削除する。未ビルドなら何もしない
    pub async fn remove(&mut self) -> BuildResult<()> {
        if let Some(id) = self.image_id.take() {
            tracing::debug!("Removing image {}", id);
            if let Err(e) = self.runtime.remove_image(&id).await {
                self.image_id = Some(id);
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// 削除の責任を呼び出し元に移し、イメージIDを返す
    pub fn into_image_id(mut self) -> Option<String> {
        self.image_id.take()
    }

    /// ビルド → 本体実行 → 削除 をまとめて行う
    ///
    /// 本体にはイメージIDが渡される。本体が失敗・panic しても削除は行われる。
    pub async fn run_scoped<T, E, F>(mut self, body: F) -> std::result::Result<T, E>
    where
        F: for<'a> FnOnce(&'a str) -> BoxFuture<'a, std::result::Result<T, E>>,
        E: From<BuildError>,
    {
        let image_id = self.build().await?.to_string();

        let outcome = AssertUnwindSafe(body(&image_id)).catch_unwind().await;
        let removed = self.remove().await;

        match outcome {
            Ok(Ok(value)) => {
                removed?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(remove_err) = removed {
                    tracing::warn!("Failed to remove image {}: {}", image_id, remove_err);
                }
                Err(e)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for BuildContext {
    fn drop(&mut self) {
        let Some(id) = self.image_id.take() else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No async runtime available, image {} left behind", id);
            return;
        };

        let runtime = self.runtime.clone();
        handle.spawn(async move {
            if let Err(e) = runtime.remove_image(&id).await {
                tracing::debug!("Best-effort removal of image {} failed: {}", id, e);
            }
        });
    }
}
