use crate::api::{ApiError, Job, JobApi, JobId, JobStatus, NewJob};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// `updated_secs` 为相对固定起点的秒数，None 表示后端尚未写 updated_at
pub fn job(id: JobId, status: JobStatus, updated_secs: Option<i64>) -> Job {
    Job {
        id,
        status,
        created_at: epoch(),
        updated_at: updated_secs.map(|s| epoch() + Duration::seconds(s)),
        error_message: None,
        backtest_run_id: None,
        config: NewJob::new("SmaCrossover", 10_000.0),
    }
}

/// 按脚本依次返回响应的假后端，并统计每个接口的调用次数
#[derive(Default)]
pub struct ScriptedApi {
    lists: Mutex<VecDeque<Result<Vec<Job>, ApiError>>>,
    details: Mutex<HashMap<JobId, VecDeque<Result<Job, ApiError>>>>,
    creates: Mutex<VecDeque<Result<Job, ApiError>>>,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn push_list(&self, resp: Result<Vec<Job>, ApiError>) {
        self.lists.lock().push_back(resp);
    }

    pub fn push_detail(&self, id: JobId, resp: Result<Job, ApiError>) {
        self.details.lock().entry(id).or_default().push_back(resp);
    }

    pub fn push_create(&self, resp: Result<Job, ApiError>) {
        self.creates.lock().push_back(resp);
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_polls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobApi for ScriptedApi {
    async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.lists
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("no scripted list".into())))
    }

    async fn get_job(&self, id: JobId) -> Result<Job, ApiError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .lock()
            .get_mut(&id)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(ApiError::Network("no scripted detail".into())))
    }

    async fn create_job(&self, _job: &NewJob) -> Result<Job, ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.creates
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("no scripted create".into())))
    }
}
