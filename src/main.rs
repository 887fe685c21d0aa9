// ==========================================
// 考试排考系统 - 命令行入口
// ==========================================
// 职责: 加载配置 → 连接远端排考服务 → 执行子命令 → JSON 输出到 stdout
// 配置: 默认值 ← 配置文件(--config 或默认路径) ← EXAM_BOARD_* 环境变量
// ==========================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exam_board::api::ImportApi;
use exam_board::config::ConfigManager;
use exam_board::logging;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "exam-board", version, about = "考试排考系统：批量导入、冲突与容量报表")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径（缺省读取用户配置目录下的 exam-board/config.json）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 远端服务地址（覆盖配置）
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// 以 JSON 格式输出日志
    #[arg(long, global = true)]
    json_log: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 从 Excel/CSV 批量导入考试
    Import {
        /// 表格文件 (.xlsx/.xls/.ods/.csv)
        file: PathBuf,
        /// 目标学期 ID
        #[arg(short, long)]
        term: i64,
    },
    /// 导出学期考试 (.xlsx/.csv)
    Export {
        #[arg(short, long)]
        term: i64,
        /// 输出文件，按扩展名选择格式
        #[arg(short, long)]
        output: PathBuf,
    },
    /// 考场冲突报表
    Conflicts {
        #[arg(short, long)]
        term: i64,
    },
    /// 考场容量使用率报表
    Capacity {
        #[arg(short, long)]
        term: i64,
    },
    /// 考场利用率报表
    Utilization {
        #[arg(short, long)]
        term: i64,
    },
    /// 列出可选择的学期
    Terms,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("输出序列化失败")?;
    println!("{}", rendered);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ConfigManager> {
    let config = ConfigManager::load(cli.config.as_deref()).context("配置加载失败")?;
    config
        .merge_env(std::env::vars())
        .context("环境变量配置无效")?;
    if let Some(base_url) = &cli.base_url {
        config
            .set(exam_board::config::config_keys::API_BASE_URL, base_url.clone())
            .context("服务地址无效")?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json_log {
        logging::init_json();
    } else {
        logging::init();
    }
    tracing::info!("{} v{}", exam_board::APP_NAME, exam_board::VERSION);

    let config = load_config(&cli)?;
    let api = ImportApi::from_config(config).context("远端服务客户端初始化失败")?;

    match cli.command {
        Commands::Import { file, term } => {
            let summary = api.import_exams(&file, term).await?;
            print_json(&summary)?;
        }
        Commands::Export { term, output } => {
            let rows = api.export_exams(term, &output).await?;
            print_json(&serde_json::json!({
                "rows": rows,
                "path": output.display().to_string(),
            }))?;
        }
        Commands::Conflicts { term } => print_json(&api.conflict_report(term).await?)?,
        Commands::Capacity { term } => print_json(&api.capacity_report(term).await?)?,
        Commands::Utilization { term } => print_json(&api.utilization_report(term).await?)?,
        Commands::Terms => print_json(&api.active_terms().await?)?,
    }

    Ok(())
}
