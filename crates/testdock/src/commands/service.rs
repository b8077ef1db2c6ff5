use crate::commands::wait_for_interrupt;
use crate::probe::tcp_probe;
use colored::Colorize;
use std::sync::Arc;
use testdock_container::{ContainerRuntime, Settings};
use testdock_services::{PostgresContainer, RabbitContainer, ServiceHandle};

pub struct PostgresOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub image: Option<String>,
    pub port: Option<u16>,
}

pub struct RabbitOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    pub cookie: Option<String>,
    pub image: Option<String>,
    pub port: Option<u16>,
    pub management_port: Option<u16>,
    pub no_management: bool,
}

pub fn postgres_container(
    runtime: Arc<dyn ContainerRuntime>,
    settings: &Settings,
    options: PostgresOptions,
) -> PostgresContainer {
    let mut pg = PostgresContainer::new(runtime, tcp_probe).with_settings(settings);

    if let Some(user) = options.user {
        pg = pg.with_user(user);
    }
    if let Some(password) = options.password {
        pg = pg.with_password(password);
    }
    if let Some(database) = options.database {
        pg = pg.with_database(database);
    }
    if let Some(image) = options.image {
        pg = pg.with_image(image);
    }
    if let Some(port) = options.port {
        pg = pg.with_port(port);
    }

    pg
}

pub fn rabbit_container(
    runtime: Arc<dyn ContainerRuntime>,
    settings: &Settings,
    options: RabbitOptions,
) -> RabbitContainer {
    let mut rabbit = RabbitContainer::new(runtime, tcp_probe).with_settings(settings);

    if let Some(user) = options.user {
        rabbit = rabbit.with_user(user);
    }
    if let Some(password) = options.password {
        rabbit = rabbit.with_password(password);
    }
    if let Some(cookie) = options.cookie {
        rabbit = rabbit.with_erlang_cookie(cookie);
    }
    if let Some(image) = options.image {
        rabbit = rabbit.with_image(image);
    }
    if let Some(port) = options.port {
        rabbit = rabbit.with_port(port);
    }
    if let Some(port) = options.management_port {
        rabbit = rabbit.with_management_port(port);
    }
    if options.no_management {
        rabbit = rabbit.without_management();
    }

    rabbit
}

pub async fn handle_postgres(
    runtime: Arc<dyn ContainerRuntime>,
    settings: &Settings,
    options: PostgresOptions,
) -> anyhow::Result<()> {
    println!("{}", "PostgreSQLを起動中...".blue());

    postgres_container(runtime, settings, options)
        .run_scoped(|pg| {
            Box::pin(async move {
                print_endpoints(pg).await?;
                if let Ok(jdbc) = pg.jdbc_connection_url() {
                    println!("  {} {}", "JDBC:".bold(), jdbc);
                }
                wait_for_interrupt().await
            })
        })
        .await?;

    println!("{}", "✓ PostgreSQLを停止しました".green());
    Ok(())
}

pub async fn handle_rabbitmq(
    runtime: Arc<dyn ContainerRuntime>,
    settings: &Settings,
    options: RabbitOptions,
) -> anyhow::Result<()> {
    println!("{}", "RabbitMQを起動中...".blue());

    rabbit_container(runtime, settings, options)
        .run_scoped(|rabbit| {
            Box::pin(async move {
                print_endpoints(rabbit).await?;
                if let Some(management_port) = rabbit.management_port() {
                    match rabbit.container_mut().get_exposed_port(management_port).await {
                        Ok(port) => println!("  {} {}", "管理UI ポート:".bold(), port),
                        Err(e) => println!("  {} {}", "管理UI:".bold(), e.to_string().dimmed()),
                    }
                }
                wait_for_interrupt().await
            })
        })
        .await?;

    println!("{}", "✓ RabbitMQを停止しました".green());
    Ok(())
}

async fn print_endpoints<S: ServiceHandle>(service: &mut S) -> anyhow::Result<()> {
    {
        let container = service.container();
        println!(
            "{} {} ({})",
            "✓ 起動しました:".green(),
            container.config().image.cyan(),
            container.short_id().unwrap_or_default()
        );
    }

    let url = service.connection_url().await?;
    println!();
    println!("  {} {}", "接続URL:".bold(), url.cyan());
    if let Ok(external) = service.external_connection_url() {
        println!("  {} {}", "コンテナ間:".bold(), external);
    }
    Ok(())
}
