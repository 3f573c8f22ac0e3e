//! State-detection engine for the slua control tower: roster source, probe
//! construction and classification, per-worker state records, the concurrent
//! poller, and the operator notification primitives. The presentation layer
//! lives in the `slua` binary crate.

pub mod channel;
pub mod config;
pub mod notify;
pub mod poller;
pub mod probe;
pub mod source;
pub mod state;
pub mod worker;

pub use config::{Config, ConfigError};
pub use notify::{Bell, Notification, NotificationRing};
pub use poller::{PollerConfig, PollerHandle, PollerUpdate};
pub use source::{SourceError, SpriteCli, WorkerSource};
pub use state::{WorkerState, MAX_BACKOFF, UNREACHABLE_THRESHOLD};
pub use worker::{normalize_status, Worker, WorkerStatus};
