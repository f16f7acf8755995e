use crate::api::{ApiError, Job, JobId, JobStatus};
use std::time::Duration;

/// 单个任务的轮询节奏
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// 1.0 表示固定间隔；大于 1 时按指数退避
    pub backoff: f64,
    pub max_delay: Duration,
    /// None 表示不设上限，一直轮询到终态
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            backoff: 1.0,
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    /// 已完成 `attempt` 次轮询后，下一次请求前的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.backoff.is_nan() || self.backoff <= 1.0 {
            return self.interval;
        }
        let base = self.interval.as_millis() as f64;
        let cap = self.max_delay.as_millis().max(self.interval.as_millis()) as f64;
        let exp = (base * self.backoff.powi(attempt.min(32) as i32)).min(cap);
        let mut delay = exp as u64;
        // jitter: 0~20%
        delay += (delay / 5) * (rand::random::<u8>() as u64 % 5) / 5;
        Duration::from_millis(delay)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempts >= max)
    }
}

/// 单个任务的轮询状态机
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollState {
    Idle,
    Polling { attempt: u32, next_delay: Duration },
    Terminal,
    /// 未观察到终态就放弃（次数用尽或后端已不存在该任务）
    Retired,
}

impl PollState {
    pub fn is_polling(&self) -> bool {
        matches!(self, PollState::Polling { .. })
    }
}

/// 列表视图过滤：只看进行中的任务，或全部
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewFilter {
    #[default]
    Active,
    All,
}

impl ViewFilter {
    pub fn matches(self, job: &Job) -> bool {
        match self {
            ViewFilter::Active => !job.status.is_terminal(),
            ViewFilter::All => true,
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            ViewFilter::Active => ViewFilter::All,
            ViewFilter::All => ViewFilter::Active,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewFilter::Active => "ACTIVE",
            ViewFilter::All => "ALL",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn collect<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        for job in jobs {
            stats.record(job.status);
        }
        stats
    }

    pub fn record(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("任务 #{0} 轮询 {1} 次仍未结束，已放弃")]
    Exhausted(JobId, u32),
    #[error("任务 #{0} 在后端已不存在")]
    Vanished(JobId),
    #[error("任务 #{0} 已不在跟踪集合中")]
    Untracked(JobId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_interval_by_default() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(50), Duration::from_millis(2000));
        assert!(!policy.exhausted(u32::MAX));
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = PollPolicy {
            interval: Duration::from_millis(1000),
            backoff: 2.0,
            max_delay: Duration::from_millis(5000),
            max_attempts: Some(10),
        };
        let d2 = policy.delay_for(2);
        assert!(d2 >= Duration::from_millis(4000) && d2 <= Duration::from_millis(4800));
        let d9 = policy.delay_for(9);
        assert!(d9 >= Duration::from_millis(5000) && d9 <= Duration::from_millis(6000));
        assert!(!policy.exhausted(9));
        assert!(policy.exhausted(10));
    }

    #[test]
    fn filter_toggles() {
        assert_eq!(ViewFilter::default(), ViewFilter::Active);
        assert_eq!(ViewFilter::Active.toggle(), ViewFilter::All);
        assert_eq!(ViewFilter::All.toggle().label(), "ACTIVE");
    }
}
