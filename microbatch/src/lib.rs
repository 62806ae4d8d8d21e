//! Priority-preemptive micro-batch scheduler.
//!
//! Callers submit lists of ids tagged `HIGH`, `MEDIUM` or `LOW`. A single dispatcher
//! wakes at most once per `batch_delay`, drains up to `batch_size` ids from the
//! highest-priority queues first (filling a batch across priorities when a queue runs
//! dry), sends every id through an external call, and records the outcome. Each
//! request's status is derived from the batches its ids landed in.
//!
//! # Example
//! ```ignore
//! use microbatch::{DispatcherConfig, IngestManager, InMemoryIngestManager, MockCall, Priority, Submission};
//!
//! let manager = InMemoryIngestManager::new(Arc::new(MockCall::new()), DispatcherConfig::default(), window);
//! let handle = manager.run(shutdown.clone())?;
//!
//! let outcome = manager.submit(Submission::new(vec![1, 2, 3, 4], Priority::High)).await?;
//! let view = manager.get_status(outcome.request_id).await?;
//! ```

pub mod api;
pub mod app;
pub mod batch;
pub mod call;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod queue;
pub mod registry;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use app::Application;
pub use batch::{AnyBatch, Batch, BatchId, BatchStatus, BatchSummary, ItemOutcome, ItemResult};
pub use call::{ExternalCall, HttpCall, MockCall, SimulatedCall};
pub use config::Config;
pub use dispatcher::{BatchUpdate, Dispatcher, DispatcherConfig};
pub use error::{Result, SchedulerError};
pub use manager::in_memory::InMemoryIngestManager;
pub use manager::{IngestManager, Submission, SubmitOutcome};
pub use queue::{select_next_batch, IntakeQueues, QueueDepth, SharedIntake};
pub use registry::{Progress, Registry, RequestView};
pub use types::{ItemId, Priority, RequestId, RequestRecord, RequestStatus};
