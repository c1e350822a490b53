use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use feeder_config::AppConfig;
use feeder_infrastructure::{init_logging, init_metrics, LogFormat};
use node_feeder::{app::Application, shutdown::ShutdownManager};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("node-feeder")
        .version(env!("CARGO_PKG_VERSION"))
        .about("节点命令调度服务")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时按默认路径查找"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty", "compact"]),
        )
        .arg(
            Arg::new("max-retry")
                .long("max-retry")
                .value_name("N")
                .help("命令失败后的最大重试次数")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_name("N")
                .help("并发处理的命令数量")
                .value_parser(value_parser!(usize)),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);

    // 加载配置
    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认路径>")))?;
    apply_overrides(&mut config, &matches);
    config.validate().context("命令行参数覆盖后的配置无效")?;

    // 初始化日志系统
    let observability = &config.observability;
    init_logging(
        &observability.log_level,
        LogFormat::parse(&observability.log_format)?,
    )?;

    if observability.metrics_enabled {
        let bind: SocketAddr = observability
            .metrics_bind
            .parse()
            .with_context(|| format!("无效的指标监听地址: {}", observability.metrics_bind))?;
        init_metrics(bind)?;
        feeder_dispatcher::metrics::describe_metrics();
    }

    info!("启动节点命令调度服务");
    info!(
        queue = %config.broker.queue,
        exchange = %config.broker.exchange,
        max_retry = config.broker.max_retry_count,
        workers = config.dispatcher.worker_count,
        "调度配置"
    );

    let grace = config.dispatcher.shutdown_grace();
    let app = Arc::new(Application::new(config).await?);

    // 创建优雅关闭管理器
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    // 等待关闭信号，或应用自行退出
    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
            shutdown_manager.shutdown().await;
        }
        result = &mut app_handle => {
            return match result {
                Ok(Ok(())) => {
                    warn!("调度监听器在未收到关闭信号时退出");
                    Ok(())
                }
                Ok(Err(e)) => Err(e),
                Err(e) => Err(anyhow::anyhow!("应用任务异常退出: {e}")),
            };
        }
    }

    // 等待应用关闭，超时时间比在途命令的等待时间略长
    match tokio::time::timeout(grace + Duration::from_secs(5), app_handle).await {
        Ok(Ok(Ok(()))) => info!("应用已优雅关闭"),
        Ok(Ok(Err(e))) => error!("应用关闭时发生错误: {e:#}"),
        Ok(Err(e)) => error!("应用任务异常退出: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("节点命令调度服务已退出");
    Ok(())
}

/// 命令行参数优先于配置文件和环境变量
fn apply_overrides(config: &mut AppConfig, matches: &ArgMatches) {
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
    if let Some(max_retry) = matches.get_one::<u32>("max-retry") {
        config.broker.max_retry_count = *max_retry;
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.dispatcher.worker_count = *workers;
    }
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
