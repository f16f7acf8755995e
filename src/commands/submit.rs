use crate::api::NewJob;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

pub const SUBMIT_USAGE: &str = "用法: submit <strategy> <capital> [symbol=BTCUSDT] [interval=1d] [start=YYYY-MM-DD] [end=YYYY-MM-DD] [tp=0.05] [sl=0.02] [参数=值 ...]";

/// 解析 `submit` 的参数（不含命令名本身）
pub fn parse_submit(args: &[&str]) -> Result<NewJob, String> {
    let strategy = args.first().ok_or_else(|| SUBMIT_USAGE.to_string())?;
    let capital_raw = args.get(1).ok_or_else(|| SUBMIT_USAGE.to_string())?;
    let capital = capital_raw
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite() && *c > 0.0)
        .ok_or_else(|| format!("初始资金必须是正数: {}", capital_raw))?;

    let mut job = NewJob::new(*strategy, capital);

    for tok in &args[2..] {
        let (key, value) = tok
            .split_once('=')
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .ok_or_else(|| format!("参数格式应为 key=value: {}", tok))?;

        match key.to_ascii_lowercase().as_str() {
            "symbol" => job.symbol = value.to_ascii_uppercase(),
            "interval" | "tf" => job.interval = value.to_string(),
            "start" | "start_date" => job.start_date = Some(normalize_date(value)?),
            "end" | "end_date" => job.end_date = Some(normalize_date(value)?),
            "tp" | "take_profit_pct" => job.take_profit_pct = Some(parse_pct(key, value)?),
            "sl" | "stop_loss_pct" => job.stop_loss_pct = Some(parse_pct(key, value)?),
            _ => {
                job.strategy_params
                    .insert(key.to_string(), parse_param_value(value));
            }
        }
    }

    if let (Some(start), Some(end)) = (&job.start_date, &job.end_date) {
        if start >= end {
            return Err(format!("开始日期必须早于结束日期: {} >= {}", start, end));
        }
    }

    Ok(job)
}

/// 日期统一成 `YYYY-MM-DDTHH:MM:SS`，只给日期时补零点
fn normalize_date(raw: &str) -> Result<String, String> {
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(format!("{}T00:00:00", d.format("%Y-%m-%d")));
    }
    if NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").is_ok()
        || DateTime::parse_from_rfc3339(raw).is_ok()
    {
        return Ok(raw.to_string());
    }
    Err(format!("无法识别的日期: {}", raw))
}

/// 接受小数 (0.05) 或百分号 (5%)
fn parse_pct(key: &str, raw: &str) -> Result<f64, String> {
    let (num, scale) = match raw.strip_suffix('%') {
        Some(n) => (n, 100.0),
        None => (raw, 1.0),
    };
    num.parse::<f64>()
        .ok()
        .map(|v| v / scale)
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| format!("{} 必须是正数: {}", key, raw))
}

fn parse_param_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
