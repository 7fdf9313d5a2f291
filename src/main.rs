//! Shiny Notifier CLI
//!
//! 定时查询 MAD 的闪光遭遇，新事件汇总后推送到 Discord / Telegram

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use shiny_notifier::{
    run_forever, source, AppConfig, DigestFormatter, NotificationBuilder,
    NotificationStore, Poller,
};

#[derive(Parser)]
#[command(name = "shiny-notifier")]
#[command(about = "Shiny Notifier - 推送 MAD 闪光遭遇通知")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/shiny-notifier/config.json）
    #[arg(long, short, global = true, env = "SHINY_NOTIFIER_CONFIG")]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 持续轮询并发送通知
    Run {
        /// 轮询间隔（秒），覆盖配置文件
        #[arg(long, short)]
        interval: Option<u64>,
        /// Dry-run 模式（只打印不发送）
        #[arg(long)]
        dry_run: bool,
    },
    /// 只执行一轮
    Once {
        /// Dry-run 模式（只打印不发送）
        #[arg(long)]
        dry_run: bool,
    },
    /// 校验配置文件
    CheckConfig,
    /// 查看最近发送的通知
    History {
        /// 显示最近 N 条
        #[arg(long, short, default_value = "10")]
        limit: usize,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 通过 RUST_LOG 控制日志级别，默认为 info
    // 例如: RUST_LOG=debug shiny-notifier run
    let default_filter = if cli.verbose {
        "shiny_notifier=debug"
    } else {
        "shiny_notifier=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    // 配置错误在进入轮询前直接退出
    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Run { interval, dry_run } => {
            let interval = match interval {
                Some(0) => anyhow::bail!("--interval must be greater than 0"),
                Some(secs) => Duration::from_secs(secs),
                None => config.interval(),
            };
            let mut poller = build_poller(&config, dry_run)?;

            info!(interval_secs = interval.as_secs(), dry_run, "Starting shiny notifier");
            tokio::select! {
                _ = run_forever(interval, &mut poller) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C, shutting down");
                }
            }
        }
        Commands::Once { dry_run } => {
            let mut poller = build_poller(&config, dry_run)?;
            let report = poller
                .poll_once(Utc::now())
                .await
                .context("Poll cycle failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::CheckConfig => {
            let source = source::from_config(&config)?;
            let dispatcher = NotificationBuilder::from_config(&config)?.build()?;

            println!("配置有效");
            println!("  数据源: {}", source.name());
            println!("  轮询间隔: {}s", config.interval_secs);
            println!("  去重窗口: {}s", config.retention_secs);
            println!("  语言: {}", config.locale()?.code());
            if dispatcher.channel_count() == 0 {
                println!("  通知渠道: 无（新事件只会写入日志）");
            } else {
                println!("  通知渠道: {}", dispatcher.channel_names().join(", "));
            }
        }
        Commands::History { limit, json } => {
            let store = NotificationStore::new(NotificationStore::default_path());
            let records = store.read_recent(limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("暂无通知记录");
            } else {
                for record in records {
                    let failed = if record.failed.is_empty() {
                        String::new()
                    } else {
                        format!(" (失败: {})", record.failed.join(", "))
                    };
                    println!(
                        "{}  {} x{} -> {}{}",
                        record.ts.format("%Y-%m-%d %H:%M:%S"),
                        record.lead,
                        record.count,
                        record.delivered_to.join(", "),
                        failed
                    );
                }
            }
        }
    }

    Ok(())
}

/// 根据配置组装轮询器
fn build_poller(config: &AppConfig, dry_run: bool) -> Result<Poller> {
    let source = source::from_config(config).context("Failed to create event source")?;
    let formatter = DigestFormatter::new(config.locale()?).with_offset(config.utc_offset()?);
    let dispatcher = NotificationBuilder::from_config(config)?
        .dry_run(dry_run)
        .build()?;

    if dispatcher.channel_count() == 0 {
        info!("No notification channel configured, digests will only be logged");
    }

    let mut poller = Poller::new(source, formatter, dispatcher)
        .with_lookback(config.lookback()?)
        .with_max_backfill(config.max_backfill()?)
        .with_retention(config.retention()?);

    if config.persist_log {
        poller = poller.with_store(NotificationStore::new(NotificationStore::default_path()));
    }

    Ok(poller)
}
