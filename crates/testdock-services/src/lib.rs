//! testdock の設定済みサービスコンテナ
//!
//! PostgreSQL と RabbitMQ を起動し、接続確認が通るまで待ってから
//! 呼び出し元の配置に応じた接続URLを返します。

pub mod postgres;
pub mod rabbitmq;
pub mod service;
pub mod url;

pub use postgres::PostgresContainer;
pub use rabbitmq::RabbitContainer;
pub use service::{ReadinessCheck, ServiceHandle, readiness_check};
pub use url::{build_amqp_url, build_jdbc_url, build_postgres_url};
