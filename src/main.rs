// ==========================================
// 促销基线估算系统 - 命令行入口
// ==========================================
// 用法:
//   promo-baseline [db_path] <command> [args...]
//
// 命令:
//   create <new_baseline.json>            创建草稿基线
//   list [status]                         列出基线
//   show <baseline_id>                    基线 + 基线期 + 分解记录
//   calculate <baseline_id>...            计算（多个 id 并行）
//   approve <baseline_id>                 审批
//   archive <baseline_id>                 归档
//   rollback <baseline_id>                人工回滚卡在 calculating 的基线
//   decompose <baseline_id> <promotion_id> [rates.json]
//   config [key value]                    查看 / 写入配置
//
// 结果以 JSON 输出到 stdout，日志输出到 stderr
// ==========================================

use promo_baseline::app::{get_default_db_path, AppState};
use promo_baseline::config::EngineConfigReader;
use promo_baseline::domain::{BaselineStatus, EffectRates, NewBaseline};
use promo_baseline::engine::DecompositionRequest;
use promo_baseline::logging;
use serde::Serialize;

const COMMANDS: [&str; 9] = [
    "create", "list", "show", "calculate", "approve", "archive", "rollback", "decompose", "config",
];

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run(std::env::args().skip(1).collect()).await {
        eprintln!("错误: {}", e);
        std::process::exit(1);
    }
}

async fn run(mut args: Vec<String>) -> CliResult<()> {
    let db_path = match args.first() {
        Some(first) if !COMMANDS.contains(&first.as_str()) => args.remove(0),
        _ => get_default_db_path(),
    };
    if args.is_empty() {
        print_usage();
        return Ok(());
    }
    let command = args.remove(0);

    tracing::info!(
        "{} v{} - 数据库: {}",
        promo_baseline::APP_NAME,
        promo_baseline::VERSION,
        db_path
    );
    let state = AppState::new(db_path)?;
    let api = state.baseline_api.clone();

    match command.as_str() {
        "create" => {
            let path = arg(&args, 0, "new_baseline.json")?;
            let draft: NewBaseline = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            print_json(&api.create_baseline(draft)?)
        }
        "list" => {
            let status = match args.first() {
                Some(s) => Some(s.parse::<BaselineStatus>()?),
                None => None,
            };
            print_json(&api.list_baselines(status)?)
        }
        "show" => {
            let id = arg(&args, 0, "baseline_id")?;
            print_json(&serde_json::json!({
                "baseline": api.get_baseline(id)?,
                "periods": api.list_periods(id)?,
                "decompositions": api.list_decompositions(id)?,
            }))
        }
        "calculate" => {
            if args.is_empty() {
                return Err("缺少参数: baseline_id".into());
            }
            let results = api.calculate_many(&args).await;
            let mut failed = 0usize;
            let report: Vec<serde_json::Value> = results
                .into_iter()
                .map(|(id, result)| match result {
                    Ok(summary) => serde_json::json!({ "baseline_id": id, "ok": summary }),
                    Err(e) => {
                        failed += 1;
                        serde_json::json!({ "baseline_id": id, "error": e.to_string() })
                    }
                })
                .collect();
            print_json(&report)?;
            if failed > 0 {
                return Err(format!("{} 个基线计算失败", failed).into());
            }
            Ok(())
        }
        "approve" => print_json(&api.approve_baseline(arg(&args, 0, "baseline_id")?)?),
        "archive" => print_json(&api.archive_baseline(arg(&args, 0, "baseline_id")?)?),
        "rollback" => print_json(&api.force_rollback(arg(&args, 0, "baseline_id")?)?),
        "decompose" => {
            let rates = match args.get(2) {
                Some(path) => serde_json::from_str::<EffectRates>(&std::fs::read_to_string(path)?)?,
                None => EffectRates::default(),
            };
            let request = DecompositionRequest {
                baseline_id: arg(&args, 0, "baseline_id")?.to_string(),
                promotion_id: arg(&args, 1, "promotion_id")?.to_string(),
                period_start: None,
                period_end: None,
                rates,
            };
            print_json(&api.decompose_volume(request)?)
        }
        "config" => {
            if let (Some(key), Some(value)) = (args.first(), args.get(1)) {
                state.config_manager.set_config_value(key, value)?;
            }
            let reader: &dyn EngineConfigReader = state.config_manager.as_ref();
            print_json(&serde_json::json!({
                "stored": serde_json::from_str::<serde_json::Value>(
                    &state.config_manager.get_config_snapshot()?
                )?,
                "effective": reader.get_engine_settings().await?,
            }))
        }
        other => {
            print_usage();
            Err(format!("未知命令: {}", other).into())
        }
    }
}

fn arg<'a>(args: &'a [String], idx: usize, name: &str) -> CliResult<&'a str> {
    args.get(idx)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("缺少参数: {}", name).into())
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_usage() {
    eprintln!("用法: promo-baseline [db_path] <command> [args...]");
    eprintln!("命令: {}", COMMANDS.join(" | "));
}
