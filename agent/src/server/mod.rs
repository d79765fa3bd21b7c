pub mod config;
pub mod config_store;
pub mod directory_client;
pub mod proxy_control;
pub mod reconcile;
pub mod traffic;
pub mod v2ray_api;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use common::protocol::control::ProxyController;
use common::protocol::directory::DirectoryClient;

use self::config::Config;
use self::config_store::ConfigStore;
use self::directory_client::HttpDirectoryClient;
use self::proxy_control::V2rayProxyControl;
use self::reconcile::ReconciliationEngine;
use self::traffic::{ReportOutcome, TrafficAccountant};
use self::v2ray_api::V2rayApiClient;

/// 初始化 tracing 日志系统
///
/// 指定日志目录时按天轮转写入文件，否则输出到控制台。
pub fn init_tracing(log_dir: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, "v2ray-agent.log");
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(file_appender).with_ansi(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

fn build_controller(config: &Config) -> Result<Arc<dyn ProxyController>> {
    let api = V2rayApiClient::connect_lazy(&config.v2ray_api_endpoint(), config.request_timeout())
        .context("创建 V2Ray API 客户端失败")?;
    let store = ConfigStore::new(&config.v2ray_config_path);
    Ok(Arc::new(V2rayProxyControl::new(api, store)))
}

fn build_directory(config: &Config) -> Result<Arc<dyn DirectoryClient>> {
    let client = HttpDirectoryClient::new(
        config.directory_url.clone(),
        config.node_id.clone(),
        config.api_key.clone(),
        config.request_timeout(),
    )
    .context("创建用户目录客户端失败")?;
    Ok(Arc::new(client))
}

/// 运行 agent：定时同步用户、定时上报流量，直到收到终止信号
pub async fn run_agent(config: Config) -> Result<()> {
    info!("v2ray-agent 启动");
    info!("节点 ID: {}", config.node_id);
    info!("用户目录: {}", config.directory_url);
    info!("V2Ray API: {}", config.v2ray_api_endpoint());
    info!("入站 tag: {}", config.inbound_tag);
    info!("V2Ray 配置文件: {}", config.v2ray_config_path);

    let controller = build_controller(&config)?;
    let directory = build_directory(&config)?;

    let engine = Arc::new(ReconciliationEngine::new(controller.clone(), directory.clone()));
    let accountant = Arc::new(TrafficAccountant::new(controller, directory));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_task = start_user_sync_task(
        engine,
        config.inbound_tag.clone(),
        config.check_user_interval(),
        shutdown_rx.clone(),
    );
    let traffic_task = start_traffic_report_task(
        accountant,
        config.inbound_tag.clone(),
        config.update_traffic_interval(),
        shutdown_rx,
    );

    info!(
        "定时任务已启动: 用户同步每 {} 秒，流量上报每 {} 秒",
        config.check_user_interval, config.update_traffic_interval
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C 信号，正在退出...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("收到 SIGTERM 信号，正在退出...");
        }
    }

    // 等待进行中的周期完成，避免已清零的流量计数未上报就退出
    let _ = shutdown_tx.send(true);
    for task in [sync_task, traffic_task] {
        if let Err(e) = task.await {
            error!("定时任务异常退出: {}", e);
        }
    }
    info!("已退出");

    Ok(())
}

/// 执行一次用户同步后退出
pub async fn run_sync_once(config: Config) -> Result<()> {
    let controller = build_controller(&config)?;
    let directory = build_directory(&config)?;
    let engine = ReconciliationEngine::new(controller, directory);

    let report = engine.run_cycle(&config.inbound_tag).await?;
    if report.is_noop() {
        info!("同步完成: 用户已是最新");
        return Ok(());
    }
    info!(
        "同步完成: 添加 {} 个，删除 {} 个，跳过 {} 个，配置文件{}",
        report.added.len(),
        report.removed.len(),
        report.skipped.len(),
        if report.config_written { "已更新" } else { "未变更" }
    );
    for skipped in &report.skipped {
        warn!("{}用户 {} 被跳过: {}", skipped.operation, skipped.user_id, skipped.reason);
    }

    Ok(())
}

/// 等待下一个周期，收到退出通知时返回 false
async fn wait_next_tick(interval: &mut tokio::time::Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        biased;
        _ = shutdown.changed() => false,
        _ = interval.tick() => true,
    }
}

/// 启动用户同步任务，首次执行在一个周期之后
fn start_user_sync_task(
    engine: Arc<ReconciliationEngine>,
    inbound_tag: String,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while wait_next_tick(&mut interval, &mut shutdown).await {
            if let Err(e) = engine.run_cycle(&inbound_tag).await {
                warn!("本次用户同步未执行: {}", e);
            }
        }
        info!("用户同步任务已停止");
    })
}

/// 启动流量上报任务，首次执行在一个周期之后
fn start_traffic_report_task(
    accountant: Arc<TrafficAccountant>,
    inbound_tag: String,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while wait_next_tick(&mut interval, &mut shutdown).await {
            match accountant.report_traffic(&inbound_tag).await {
                Ok(ReportOutcome::Submitted) => {}
                Ok(ReportOutcome::Retained(_)) => {
                    warn!("流量记录已保留，将在下个周期重试");
                }
                Err(e) => error!("本次流量上报未执行: {:#}", e),
            }
        }
        info!("流量上报任务已停止");
    })
}
