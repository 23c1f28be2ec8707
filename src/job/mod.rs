//! Asynchronous job protocol: submit, wait for the completion notification,
//! then page through the results.
//!
//! Each step takes its collaborators explicitly so the protocol can run
//! against in-memory fakes.

pub mod paginate;
pub mod submit;
pub mod waiter;

pub use paginate::{fetch_all_results, JobResults, DEFAULT_PAGE_SIZE};
pub use submit::submit_job;
pub use waiter::{
    CancelToken, Clock, CompletionWaiter, SystemClock, WaitOutcome, WaitSettings,
    DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL,
};
