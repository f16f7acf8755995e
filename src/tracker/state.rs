use crate::api::{ApiError, Job, JobId};
use crate::tracker::list::JobList;
use crate::tracker::model::{PollPolicy, PollState, TrackerError};
use log::warn;
use std::collections::HashMap;

/// 一次轮询响应处理后的去向
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    Continue,
    Finished(Result<Job, TrackerError>),
}

/// 跟踪器的同步状态：展示列表 + 每个任务的轮询状态机
///
/// 跟踪集合（Tracked Set）就是处于 `Polling` 的 id。
#[derive(Debug, Default)]
pub struct TrackerState {
    pub jobs: JobList,
    polls: HashMap<JobId, PollState>,
}

impl TrackerState {
    pub fn poll_state(&self, id: JobId) -> PollState {
        self.polls.get(&id).copied().unwrap_or(PollState::Idle)
    }

    pub fn is_tracked(&self, id: JobId) -> bool {
        self.poll_state(id).is_polling()
    }

    pub fn tracked_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .polls
            .iter()
            .filter(|(_, s)| s.is_polling())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// 全量刷新：合并列表，并把已经是终态的 id 移出跟踪集合
    pub fn apply_refresh(&mut self, fetched: Vec<Job>) -> Vec<JobId> {
        self.jobs.replace_all(fetched);

        let mut finished = Vec::new();
        for (id, state) in self.polls.iter_mut() {
            if !state.is_polling() {
                continue;
            }
            if let Some(job) = self.jobs.get(*id) {
                if job.status.is_terminal() {
                    *state = PollState::Terminal;
                    finished.push(*id);
                }
            }
        }

        // 已结束且不在列表里的任务不再需要记录；Retired 保留，避免被重新拉起
        let jobs = &self.jobs;
        self.polls
            .retain(|id, state| *state != PollState::Terminal || jobs.get(*id).is_some());

        finished.sort_unstable();
        finished
    }

    /// 为每个未终态、且从未轮询过的任务进入 `Polling`，返回需要启动轮询的 id
    pub fn start_polling(&mut self, policy: &PollPolicy) -> Vec<JobId> {
        let mut started = Vec::new();
        for job in self.jobs.as_slice() {
            if job.status.is_terminal() {
                continue;
            }
            let state = self.polls.entry(job.id).or_insert(PollState::Idle);
            if *state == PollState::Idle {
                *state = PollState::Polling {
                    attempt: 0,
                    next_delay: policy.delay_for(0),
                };
                started.push(job.id);
            }
        }
        started
    }

    /// 处理一次详情轮询的结果
    pub fn apply_poll(
        &mut self,
        id: JobId,
        result: Result<Job, ApiError>,
        policy: &PollPolicy,
    ) -> PollStep {
        let attempt = match self.poll_state(id) {
            PollState::Polling { attempt, .. } => attempt + 1,
            _ => {
                // 刷新已经先一步让它退出跟踪，响应仍然可以合并
                if let Ok(job) = result {
                    self.jobs.merge(job);
                }
                return PollStep::Finished(Err(TrackerError::Untracked(id)));
            }
        };

        match result {
            Ok(job) => {
                let terminal = job.status.is_terminal();
                self.jobs.merge(job.clone());
                if terminal {
                    self.polls.insert(id, PollState::Terminal);
                    return PollStep::Finished(Ok(job));
                }
            }
            Err(ApiError::NotFound) => {
                self.polls.insert(id, PollState::Retired);
                return PollStep::Finished(Err(TrackerError::Vanished(id)));
            }
            Err(e) => {
                warn!("⚠ 轮询任务 #{} 失败 (第 {} 次): {}", id, attempt, e);
            }
        }

        if policy.exhausted(attempt) {
            self.polls.insert(id, PollState::Retired);
            return PollStep::Finished(Err(TrackerError::Exhausted(id, attempt)));
        }

        self.polls.insert(
            id,
            PollState::Polling {
                attempt,
                next_delay: policy.delay_for(attempt),
            },
        );
        PollStep::Continue
    }
}
