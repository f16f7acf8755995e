pub mod list;
pub mod model;
pub mod service;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use model::{JobStats, PollPolicy, ViewFilter};
pub use service::JobTracker;
