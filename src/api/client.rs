use crate::api::dto::{BacktestRun, Job, JobId, NewJob, Strategy};
use crate::api::types::{ApiError, JobApi};
use crate::api::urls::ApiUrls;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// 回测后端 REST 客户端
pub struct BacktestClient {
    client: Client,
    urls: ApiUrls,
    list_limit: usize,
}

impl BacktestClient {
    pub fn new(base_url: &str, proxy: Option<&str>, list_limit: usize) -> Result<Self, ApiError> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .user_agent("btdash/0.1");

        if let Some(raw) = proxy {
            let t = raw.trim();
            if !t.is_empty() {
                let url = if t.contains("://") {
                    t.to_string()
                } else {
                    format!("socks5h://{}", t)
                };
                let proxy = reqwest::Proxy::all(&url).map_err(|e| ApiError::Network(e.to_string()))?;
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            urls: ApiUrls::new(base_url),
            list_limit: list_limit.max(1),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let resp = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("读取响应失败: {}", e)))?;

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            debug!("响应解析失败，原始报文: {}", body);
            ApiError::Decode(e.to_string())
        })
    }

    pub async fn health(&self) -> Result<(), ApiError> {
        let resp = self
            .client
            .get(self.urls.health())
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            info!("{} health ok", self);
            Ok(())
        } else {
            Err(ApiError::from_status(status.as_u16(), ""))
        }
    }

    pub async fn list_runs(&self) -> Result<Vec<BacktestRun>, ApiError> {
        let limit = self.list_limit.to_string();
        self.send_json(
            self.client
                .get(self.urls.runs())
                .query(&[("limit", limit.as_str())]),
        )
        .await
    }

    pub async fn get_run(&self, id: i64) -> Result<BacktestRun, ApiError> {
        self.send_json(self.client.get(self.urls.run(id))).await
    }

    pub async fn list_strategies(&self) -> Result<Vec<Strategy>, ApiError> {
        self.send_json(self.client.get(self.urls.strategies())).await
    }
}

#[async_trait]
impl JobApi for BacktestClient {
    async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        let limit = self.list_limit.to_string();
        self.send_json(
            self.client
                .get(self.urls.jobs())
                .query(&[("limit", limit.as_str())]),
        )
        .await
    }

    async fn get_job(&self, id: JobId) -> Result<Job, ApiError> {
        self.send_json(self.client.get(self.urls.job(id))).await
    }

    async fn create_job(&self, job: &NewJob) -> Result<Job, ApiError> {
        let created: Job = self
            .send_json(self.client.post(self.urls.jobs()).json(job))
            .await?;
        info!("{} create_job(...) [ID: {}]", self, created.id);
        Ok(created)
    }
}

impl std::fmt::Display for BacktestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<BacktestClient [{}]>", self.urls.base())
    }
}

impl std::fmt::Debug for BacktestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<BacktestClient [{}]>", self.urls.base())
    }
}
