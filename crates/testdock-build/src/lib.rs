//! testdock の使い捨てイメージビルド
//!
//! ディレクトリからイメージをビルドし、テスト終了後に削除します。

pub mod builder;
pub mod context;
pub mod error;

pub use builder::BuildContext;
pub use context::ContextBuilder;
pub use error::{BuildError, BuildResult};
