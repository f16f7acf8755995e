use super::dto::JobId;

/// 默认后端地址（FastAPI 挂载在 /api/v1 下）
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// 回测后端各接口的 URL
#[derive(Debug, Clone)]
pub struct ApiUrls {
    base: String,
}

impl ApiUrls {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn jobs(&self) -> String {
        format!("{}/backtest-jobs/", self.base)
    }

    pub fn job(&self, id: JobId) -> String {
        format!("{}/backtest-jobs/{}", self.base, id)
    }

    pub fn runs(&self) -> String {
        format!("{}/backtest-runs/", self.base)
    }

    pub fn run(&self, id: i64) -> String {
        format!("{}/backtest-runs/{}", self.base, id)
    }

    pub fn strategies(&self) -> String {
        format!("{}/strategies/", self.base)
    }

    /// 健康检查挂在服务根路径，不在 /api/v1 下
    pub fn health(&self) -> String {
        let root = self.base.strip_suffix("/api/v1").unwrap_or(&self.base);
        format!("{}/health", root)
    }
}

impl Default for ApiUrls {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}
