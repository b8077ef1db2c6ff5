mod commands;
mod docker;
mod probe;

use clap::{Parser, Subcommand};
use commands::run::{RunOptions, parse_env_pair};
use commands::service::{PostgresOptions, RabbitOptions};
use std::path::PathBuf;
use testdock_container::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "testdock")]
#[command(about = "結合テスト用の使い捨てコンテナを起動する", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// PostgreSQL を起動して接続URLを表示
    ///
    /// 準備完了の判定は TCP 接続のみ。ホストからの接続はサービスの準備完了より
    /// 先に成功することがある。
    Postgres {
        /// ユーザー名（デフォルト: user）
        #[arg(long)]
        user: Option<String>,
        /// パスワード（デフォルト: pass）
        #[arg(long)]
        password: Option<String>,
        /// データベース名（デフォルト: ユーザー名）
        #[arg(long)]
        database: Option<String>,
        /// イメージ（デフォルト: postgres:11-alpine）
        #[arg(long)]
        image: Option<String>,
        /// コンテナ側のポート（デフォルト: 5432）
        #[arg(long)]
        port: Option<u16>,
    },
    /// RabbitMQ を起動して接続URLを表示
    ///
    /// 準備完了の判定は TCP 接続のみ。ホストからの接続はサービスの準備完了より
    /// 先に成功することがある。
    Rabbitmq {
        /// ユーザー名（デフォルト: guest）
        #[arg(long)]
        user: Option<String>,
        /// パスワード（デフォルト: guest）
        #[arg(long)]
        password: Option<String>,
        /// Erlang cookie（デフォルト: rabbitmq）
        #[arg(long)]
        cookie: Option<String>,
        /// イメージ（デフォルト: rabbitmq:3-management-alpine）
        #[arg(long)]
        image: Option<String>,
        /// AMQP ポート（デフォルト: 5672）
        #[arg(long)]
        port: Option<u16>,
        /// 管理UIのポート（デフォルト: 15672）
        #[arg(long, conflicts_with = "no_management")]
        management_port: Option<u16>,
        /// 管理UIのポートを公開しない
        #[arg(long)]
        no_management: bool,
    },
    /// 任意のイメージからコンテナを起動
    Run {
        /// イメージ名
        image: String,
        /// 環境変数（KEY=VALUE、複数指定可）
        #[arg(short, long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        /// 公開するコンテナポート（複数指定可）
        #[arg(short, long = "port")]
        port: Vec<u16>,
        /// コンテナ名
        #[arg(long)]
        name: Option<String>,
        /// 接続するネットワーク
        #[arg(long)]
        network: Option<String>,
        /// 実行するコマンド（シェルと同じ規則で引用符を解釈）
        #[arg(long)]
        command: Option<String>,
    },
    /// ディレクトリの Dockerfile からイメージをビルド
    Build {
        /// Dockerfile を含むディレクトリ
        path: PathBuf,
        /// 終了時にイメージを削除しない
        #[arg(long)]
        keep: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr、接続情報は stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 設定が不正なら Docker に接続する前に失敗させる
    let settings = Settings::from_env()?;
    tracing::debug!("Settings: {:?}", settings);
    let runtime = docker::init_runtime_with_error_handling().await?;

    match cli.command {
        Commands::Postgres {
            user,
            password,
            database,
            image,
            port,
        } => {
            let options = PostgresOptions {
                user,
                password,
                database,
                image,
                port,
            };
            commands::service::handle_postgres(runtime, &settings, options).await?;
        }
        Commands::Rabbitmq {
            user,
            password,
            cookie,
            image,
            port,
            management_port,
            no_management,
        } => {
            let options = RabbitOptions {
                user,
                password,
                cookie,
                image,
                port,
                management_port,
                no_management,
            };
            commands::service::handle_rabbitmq(runtime, &settings, options).await?;
        }
        Commands::Run {
            image,
            env,
            port,
            name,
            network,
            command,
        } => {
            let options = RunOptions {
                image,
                env,
                ports: port,
                name,
                network,
                command,
            };
            commands::run::handle(runtime, &settings, options).await?;
        }
        Commands::Build { path, keep } => {
            commands::build::handle(runtime, path, keep).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_postgres() {
        let cli = Cli::try_parse_from([
            "testdock",
            "postgres",
            "--user",
            "app",
            "--database",
            "app_test",
            "--image",
            "postgres:16-alpine",
        ])
        .unwrap();

        match cli.command {
            Commands::Postgres {
                user,
                password,
                database,
                image,
                port,
            } => {
                assert_eq!(user.as_deref(), Some("app"));
                assert_eq!(password, None);
                assert_eq!(database.as_deref(), Some("app_test"));
                assert_eq!(image.as_deref(), Some("postgres:16-alpine"));
                assert_eq!(port, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rabbitmq_no_management() {
        let cli = Cli::try_parse_from(["testdock", "rabbitmq", "--no-management"]).unwrap();

        assert!(matches!(
            cli.command,
            Commands::Rabbitmq {
                no_management: true,
                management_port: None,
                ..
            }
        ));
    }

    #[test]
    fn test_management_port_conflicts_with_no_management() {
        let result = Cli::try_parse_from([
            "testdock",
            "rabbitmq",
            "--no-management",
            "--management-port",
            "15673",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_parse_run_with_repeated_flags() {
        let cli = Cli::try_parse_from([
            "testdock",
            "run",
            "redis:7-alpine",
            "-e",
            "A=1",
            "--env",
            "B=2",
            "-p",
            "6379",
            "-p",
            "16379",
            "--name",
            "cache",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                image,
                env,
                port,
                name,
                ..
            } => {
                assert_eq!(image, "redis:7-alpine");
                assert_eq!(
                    env,
                    vec![
                        ("A".to_string(), "1".to_string()),
                        ("B".to_string(), "2".to_string())
                    ]
                );
                assert_eq!(port, vec![6379, 16379]);
                assert_eq!(name.as_deref(), Some("cache"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_run_rejects_bad_env() {
        let result = Cli::try_parse_from(["testdock", "run", "alpine", "-e", "NOVALUE"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_build() {
        let cli = Cli::try_parse_from(["testdock", "build", "./app", "--keep"]).unwrap();

        match cli.command {
            Commands::Build { path, keep } => {
                assert_eq!(path, PathBuf::from("./app"));
                assert!(keep);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
