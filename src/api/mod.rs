pub mod client;
pub mod dto;
pub mod types;
pub mod urls;

pub use client::BacktestClient;
pub use dto::{BacktestRun, EquityPoint, Job, JobId, JobStatus, NewJob, Strategy};
pub use types::{ApiError, JobApi};
