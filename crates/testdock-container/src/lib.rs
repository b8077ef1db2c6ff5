//! testdock のコンテナ操作
//!
//! 結合テスト用の使い捨てコンテナを起動し、接続先を解決して、
//! 終了後に削除するための基本部品を提供します。

pub mod config;
pub mod container;
pub mod converter;
pub mod definition;
pub mod docker;
pub mod env;
pub mod error;
pub mod runtime;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod waiter;

pub use config::Settings;
pub use container::{ContainerHandle, ContainerState};
pub use definition::{ContainerConfig, VolumeMode, VolumeMount};
pub use docker::DockerRuntime;
pub use env::{Placement, inside_container};
pub use error::{ContainerError, Result};
pub use runtime::{
    ContainerDetails, ContainerIdentity, ContainerRuntime, ExecOutput, HostBinding, LogLine,
    LogStream,
};
pub use waiter::{WaitConfig, wait_until_ready};
