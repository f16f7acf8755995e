use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub type JobId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// 状态只会前进：pending(0) → running(1) → completed/failed(2)
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_interval() -> String {
    "1d".to_string()
}

/// 创建回测任务的请求体，同时也是任务记录里原样透传的配置部分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub strategy_name: String,
    #[serde(default)]
    pub strategy_params: Map<String, Value>,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub initial_capital: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_pct: Option<f64>,
}

impl NewJob {
    pub fn new(strategy_name: impl Into<String>, initial_capital: f64) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            strategy_params: Map::new(),
            symbol: default_symbol(),
            interval: default_interval(),
            start_date: None,
            end_date: None,
            initial_capital,
            take_profit_pct: None,
            stop_loss_pct: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::optional")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub backtest_run_id: Option<i64>,
    #[serde(flatten)]
    pub config: NewJob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub id: i64,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
    pub strategy_name: String,
    #[serde(default)]
    pub strategy_params: Map<String, Value>,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub timeframe: String,
    pub initial_capital: f64,
    #[serde(default)]
    pub metrics: Value,
    #[serde(default)]
    pub equity_curve: Vec<Value>,
    #[serde(default)]
    pub trades: Vec<Value>,
    #[serde(default)]
    pub total_return: Option<f64>,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub max_drawdown: Option<f64>,
    #[serde(default)]
    pub num_trades: Option<i64>,
    #[serde(default)]
    pub final_equity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: Option<String>,
    pub equity: f64,
}

impl BacktestRun {
    /// 从 equity_curve 记录中提取 {timestamp, equity}，跳过缺失或非有限值的点
    pub fn equity_points(&self) -> Vec<EquityPoint> {
        self.equity_curve
            .iter()
            .filter_map(|rec| {
                let equity = rec.get("equity").and_then(|v| v.as_f64())?;
                if !equity.is_finite() {
                    return None;
                }
                let timestamp = rec
                    .get("timestamp")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                Some(EquityPoint { timestamp, equity })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<StrategyParameter>,
}

/// 后端返回的时间戳可能带时区（RFC 3339），也可能是不带时区的本地格式，后者按 UTC 处理
pub mod timestamp {
    use super::*;

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(naive.and_utc());
            }
        }
        None
    }

    pub fn required<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_decodes_backend_record() {
        let raw = json!({
            "id": 42,
            "status": "completed",
            "created_at": "2024-05-01T10:00:00.123456",
            "updated_at": "2024-05-01T10:02:00+00:00",
            "error_message": null,
            "backtest_run_id": 7,
            "strategy_name": "SmaCrossover",
            "strategy_params": {"fast": 10, "slow": 30},
            "symbol": "ETHUSDT",
            "interval": "4h",
            "start_date": null,
            "end_date": null,
            "initial_capital": 10000.0,
            "take_profit_pct": 0.05,
            "stop_loss_pct": null
        });

        let job: Job = serde_json::from_value(raw).unwrap();
        assert_eq!(job.id, 42);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.backtest_run_id, Some(7));
        assert!(job.updated_at.unwrap() > job.created_at);
        assert_eq!(job.config.symbol, "ETHUSDT");
        assert_eq!(job.config.strategy_params["fast"], json!(10));
        assert_eq!(job.config.take_profit_pct, Some(0.05));
    }

    #[test]
    fn pending_job_without_updated_at() {
        let raw = json!({
            "id": 1,
            "status": "pending",
            "created_at": "2024-05-01T10:00:00",
            "strategy_name": "BuyAndHold",
            "initial_capital": 500
        });
        let job: Job = serde_json::from_value(raw).unwrap();
        assert_eq!(job.updated_at, None);
        assert_eq!(job.config.symbol, "BTCUSDT");
        assert_eq!(job.config.interval, "1d");
    }

    #[test]
    fn unknown_status_is_rejected() {
        let raw = json!({
            "id": 1,
            "status": "cancelled",
            "created_at": "2024-05-01T10:00:00",
            "strategy_name": "BuyAndHold",
            "initial_capital": 500
        });
        assert!(serde_json::from_value::<Job>(raw).is_err());
    }

    #[test]
    fn new_job_omits_unset_optionals() {
        let body = serde_json::to_value(NewJob::new("RSIStrategy", 1000.0)).unwrap();
        assert!(body.get("take_profit_pct").is_none());
        assert!(body.get("start_date").is_none());
        assert_eq!(body["symbol"], "BTCUSDT");
    }

    #[test]
    fn equity_points_skip_bad_records() {
        let run: BacktestRun = serde_json::from_value(json!({
            "id": 7,
            "created_at": "2024-05-01T10:00:00",
            "strategy_name": "BuyAndHold",
            "initial_capital": 10000.0,
            "equity_curve": [
                {"timestamp": "2024-01-01T00:00:00", "equity": 10000.0},
                {"timestamp": "2024-01-02T00:00:00"},
                {"timestamp": "2024-01-03T00:00:00", "equity": 10250.5}
            ]
        }))
        .unwrap();

        let points = run.equity_points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].equity, 10250.5);
        assert_eq!(points[0].timestamp.as_deref(), Some("2024-01-01T00:00:00"));
    }
}
