use crate::api::urls::DEFAULT_API_URL;
use crate::tracker::PollPolicy;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub proxy: Option<String>,
    pub poll: PollPolicy,
    pub refresh_interval: Duration,
    pub list_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            proxy: None,
            poll: PollPolicy::default(),
            refresh_interval: Duration::from_millis(5000),
            list_limit: 100,
        }
    }
}

/// 读取环境变量并解析，解析失败时记录提示并返回 None
struct EnvReader<F> {
    lookup: F,
    warnings: Vec<String>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&mut self, key: &str) -> Option<T> {
        let raw = self.raw(key)?;
        match raw.parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                self.warnings
                    .push(format!("⚠ 无法解析 {}={}，使用默认值", key, raw));
                None
            }
        }
    }

    fn reject(&mut self, key: &str, rule: &str) {
        self.warnings
            .push(format!("⚠ {} {}，使用默认值", key, rule));
    }
}

impl AppConfig {
    /// 读取 .env 与环境变量；返回配置和需要展示给用户的提示
    pub fn from_env() -> (Self, Vec<String>) {
        let mut notes = Vec::new();
        match dotenv::dotenv() {
            Ok(path) => notes.push(format!("✓ 已加载 .env 文件: {}", path.display())),
            Err(_) => notes.push("⚠ 未找到 .env 文件，使用系统环境变量".to_string()),
        }
        let (config, warnings) = Self::from_lookup(|key| std::env::var(key).ok());
        notes.extend(warnings);
        (config, notes)
    }

    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvReader {
            lookup,
            warnings: Vec::new(),
        };
        let mut config = AppConfig::default();

        if let Some(url) = env.raw("BACKTEST_API_URL") {
            config.api_url = url;
        }
        config.proxy = env.raw("BACKTEST_PROXY");

        match env.parse::<u64>("JOB_POLL_INTERVAL_MS") {
            Some(0) => env.reject("JOB_POLL_INTERVAL_MS", "必须大于 0"),
            Some(ms) => config.poll.interval = Duration::from_millis(ms),
            None => {}
        }
        match env.parse::<f64>("JOB_POLL_BACKOFF") {
            Some(b) if b.is_finite() && b >= 1.0 => config.poll.backoff = b,
            Some(_) => env.reject("JOB_POLL_BACKOFF", "必须 >= 1.0"),
            None => {}
        }
        if let Some(ms) = env.parse::<u64>("JOB_POLL_MAX_DELAY_MS") {
            config.poll.max_delay = Duration::from_millis(ms);
        }
        // 0 表示不设上限
        if let Some(n) = env.parse::<u32>("JOB_POLL_MAX_ATTEMPTS") {
            config.poll.max_attempts = if n == 0 { None } else { Some(n) };
        }
        match env.parse::<u64>("JOB_REFRESH_INTERVAL_MS") {
            Some(0) => env.reject("JOB_REFRESH_INTERVAL_MS", "必须大于 0"),
            Some(ms) => config.refresh_interval = Duration::from_millis(ms),
            None => {}
        }
        if let Some(n) = env.parse::<usize>("JOB_LIST_LIMIT") {
            config.list_limit = n.clamp(1, 1000);
        }

        (config, env.warnings)
    }
}
