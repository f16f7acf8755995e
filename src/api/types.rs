use crate::api::dto::{Job, JobId, NewJob};
use async_trait::async_trait;
use serde_json::Value;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("decode failure: {0}")]
    Decode(String),
    #[error("not found")]
    NotFound,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unexpected status {0}")]
    Status(u16),
}

impl ApiError {
    /// 按 HTTP 状态码分型，body 仅用于提取后端的 detail 信息
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            404 => ApiError::NotFound,
            400 | 422 => ApiError::Rejected(extract_detail(body)),
            _ => ApiError::Status(status),
        }
    }
}

fn extract_detail(body: &str) -> String {
    let text = body.trim();
    match serde_json::from_str::<Value>(text) {
        Ok(v) => match v.get("detail") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => v.to_string(),
        },
        Err(_) if text.is_empty() => "empty response".to_string(),
        Err(_) => text.to_string(),
    }
}

/// 任务跟踪器依赖的后端接口
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn list_jobs(&self) -> Result<Vec<Job>, ApiError>;
    async fn get_job(&self, id: JobId) -> Result<Job, ApiError>;
    async fn create_job(&self, job: &NewJob) -> Result<Job, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert_eq!(ApiError::from_status(404, ""), ApiError::NotFound);
        assert_eq!(ApiError::from_status(503, "oops"), ApiError::Status(503));
        assert_eq!(
            ApiError::from_status(400, r#"{"detail":"Unknown strategy: Foo"}"#),
            ApiError::Rejected("Unknown strategy: Foo".to_string())
        );
    }

    #[test]
    fn validation_detail_is_kept_verbatim() {
        let err = ApiError::from_status(422, r#"{"detail":[{"loc":["body","initial_capital"]}]}"#);
        match err {
            ApiError::Rejected(msg) => assert!(msg.contains("initial_capital")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
