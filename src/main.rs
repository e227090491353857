use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use st_store::config::StoreConfig;
use st_store::{ContractRelayKeys, ShareToken, StoreError, TokenStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// sharetoken 存储的运维入口：查看、导入、移除
#[derive(Parser, Debug)]
#[command(name = "st-store", version, about)]
struct Cli {
    /// TOML 配置文件
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 持久化根目录（覆盖配置文件）
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 打印分组 / 记录统计
    Stats,
    /// 按合约 / relay 过滤并输出 JSON lines
    List {
        #[arg(long, default_value = "")]
        contract: String,
        #[arg(long, default_value = "")]
        relay: String,
    },
    /// 统计某 relay 在给定时刻仍处于结算期的 token 数
    Settling {
        #[arg(long)]
        relay: String,
        /// unix 秒，缺省为当前时间
        #[arg(long)]
        at: Option<i64>,
    },
    /// 导入 JSON 格式的 sharetoken 文件
    Import { files: Vec<PathBuf> },
    /// 按 JSON 文件内容移除 sharetoken
    Remove { files: Vec<PathBuf> },
}

fn unix_secs(d: std::time::Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(unix_secs)
        .unwrap_or(0)
}

fn read_token(path: &Path) -> anyhow::Result<ShareToken> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("decoding {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = StoreConfig::load_or_default(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        cfg.root = root;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store: TokenStore<ShareToken> = TokenStore::open(&cfg.root, ContractRelayKeys)
        .with_context(|| format!("opening store at {}", cfg.root.display()))?;

    match cli.command {
        Command::Stats => print!("{}", store.stats()),
        Command::List { contract, relay } => {
            for st in store.filter(&contract, &relay) {
                println!("{}", serde_json::to_string(&*st)?);
            }
        }
        Command::Settling { relay, at } => {
            let at = at.unwrap_or_else(unix_now);
            let counts = store.settling_at(&relay, at);
            println!("{}", serde_json::to_string(&counts)?);
        }
        Command::Import { files } => {
            let mut added = 0usize;
            for f in files.iter() {
                let st = read_token(f)?;
                match store.add(st) {
                    Ok(()) => added += 1,
                    Err(StoreError::DuplicateRecord) => {
                        warn!("{} already present, skipping", f.display())
                    }
                    Err(e) => return Err(e).with_context(|| format!("adding {}", f.display())),
                }
            }
            info!("Imported {} of {} sharetokens", added, files.len());
        }
        Command::Remove { files } => {
            for f in files.iter() {
                let st = read_token(f)?;
                store
                    .delete(&st)
                    .with_context(|| format!("removing {}", f.display()))?;
            }
            info!("Processed {} removals", files.len());
        }
    }

    Ok(())
}
