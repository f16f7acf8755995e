use crate::api::{Job, JobId};
use crate::tracker::model::JobStats;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Replaced,
    Stale,
    /// 列表里没有这个 id，不插入
    Unknown,
}

/// `incoming` 是否比 `current` 更新（两者 id 相同）
///
/// 状态只会前进，所以状态更靠后的一方胜出；状态相同再比较 `updated_at`，
/// 缺失的 `updated_at` 视为更旧，完全相同时按到达顺序替换。
pub fn supersedes(incoming: &Job, current: &Job) -> bool {
    let (new_rank, old_rank) = (incoming.status.rank(), current.status.rank());
    if new_rank != old_rank {
        return new_rank > old_rank;
    }
    incoming.updated_at >= current.updated_at
}

/// 界面展示的任务列表；所有写入都经过按 id 的合并
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobList {
    jobs: Vec<Job>,
}

impl JobList {
    #[cfg(test)]
    pub fn new(jobs: Vec<Job>) -> Self {
        let mut list = Self::default();
        list.replace_all(jobs);
        list
    }

    pub fn as_slice(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// 原位替换同 id 的记录，从不改变顺序
    pub fn merge(&mut self, incoming: Job) -> Merge {
        match self.jobs.iter_mut().find(|j| j.id == incoming.id) {
            Some(current) => {
                if supersedes(&incoming, current) {
                    *current = incoming;
                    Merge::Replaced
                } else {
                    Merge::Stale
                }
            }
            None => Merge::Unknown,
        }
    }

    /// 新建的任务放在最前面（与后端按创建时间倒序一致）
    pub fn insert_front(&mut self, job: Job) -> Merge {
        if self.get(job.id).is_some() {
            return self.merge(job);
        }
        self.jobs.insert(0, job);
        Merge::Replaced
    }

    /// 用全量拉取结果替换列表：顺序以拉取结果为准，拉取结果里没有的任务被丢弃，
    /// 但同 id 的旧记录如果更新，则保留旧记录
    pub fn replace_all(&mut self, fetched: Vec<Job>) {
        let mut seen = HashSet::with_capacity(fetched.len());
        let mut next = Vec::with_capacity(fetched.len());
        for job in fetched {
            if !seen.insert(job.id) {
                continue;
            }
            match self.get(job.id) {
                Some(current) if !supersedes(&job, current) => next.push(current.clone()),
                _ => next.push(job),
            }
        }
        self.jobs = next;
    }

    pub fn stats(&self) -> JobStats {
        JobStats::collect(&self.jobs)
    }
}
