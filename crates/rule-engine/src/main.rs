//! 规则引擎批量评估工具
//!
//! 用法：`rule-engine <ruleset.json> <records.json>`
//!
//! 每条记录输出一行 JSON 评估结果。

use anyhow::{Context, Result, bail};
use rule_engine::{Diagnostics, EvaluationContext, RuleSetOptions, RuleStore};
use rule_shared::config::AppConfig;
use rule_shared::observability::{self, ObservabilityConfig};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

const SERVICE_NAME: &str = "rule-engine";

fn main() -> Result<()> {
    // 统一加载配置：从 config/{service_name}.toml 加载，包含可观测性配置
    // 配置加载失败时，日志设置退回到 RUST_LOG / JSON_LOGS 环境变量
    let (config, obs_config) = match AppConfig::load(SERVICE_NAME) {
        Ok(config) => {
            let obs_config = config.observability.clone().with_service_name(SERVICE_NAME);
            (config, obs_config)
        }
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {}", e);
            (AppConfig::default(), ObservabilityConfig::from_env(SERVICE_NAME))
        }
    };
    observability::init(&obs_config)?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        bail!("用法: {} <ruleset.json> <records.json>", SERVICE_NAME);
    }

    let store = RuleStore::new()
        .with_diagnostics(Diagnostics::new())
        .with_options(RuleSetOptions {
            trace_enabled: config.engine.trace_enabled,
            float_precision: config.engine.float_precision,
        });

    let rule_set_json = read_file(&args[1])?;
    let rule_set_id = store
        .load_from_json(&rule_set_json)
        .with_context(|| format!("规则集解析失败: {}", args[1]))?;

    let records = read_records(&args[2])?;
    info!(rule_set_id = %rule_set_id, records = records.len(), "开始批量评估");

    let start = Instant::now();
    let mut matched = 0usize;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for record in records {
        let context = EvaluationContext::new(record);
        let result = store.evaluate(&rule_set_id, &context)?;
        if result.matched {
            matched += 1;
        }
        writeln!(out, "{}", serde_json::to_string(&result)?)?;
    }
    out.flush()?;

    let stats = store.stats();
    if stats.disabled_conditions > 0 {
        warn!(disabled = stats.disabled_conditions, "部分条件定义有误，已禁用");
    }

    info!(
        rule_set_id = %rule_set_id,
        matched,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "批量评估完成"
    );

    Ok(())
}

fn read_file(path: &str) -> Result<String> {
    std::fs::read_to_string(Path::new(path)).with_context(|| format!("无法读取文件: {}", path))
}

/// 记录文件为对象数组；单个对象视为只有一条记录
fn read_records(path: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(&read_file(path)?)
        .with_context(|| format!("记录文件解析失败: {}", path))?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![value]),
        other => bail!("记录文件必须是 JSON 数组或对象，实际为: {}", other),
    }
}
