mod server;

use clap::{Parser, Subcommand};

use server::config::Config;

#[derive(Parser)]
#[command(name = "v2ray-agent", version, about = "V2Ray 节点 Agent - 用户同步与流量上报")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 前台运行，定时同步用户并上报流量
    Start {
        /// 配置文件路径（默认 v2ray-agent.toml）
        #[arg(long)]
        config: Option<String>,

        /// 日志目录（指定后按天轮转写入文件）
        #[arg(long)]
        log_dir: Option<String>,
    },

    /// 执行一次用户同步后退出
    Sync {
        /// 配置文件路径（默认 v2ray-agent.toml）
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start { config, log_dir } => {
            server::init_tracing(log_dir.as_deref());
            let config = Config::load(config.as_deref())?;
            server::run_agent(config).await?;
        }
        Command::Sync { config } => {
            server::init_tracing(None);
            let config = Config::load(config.as_deref())?;
            server::run_sync_once(config).await?;
        }
    }

    Ok(())
}
