//! The relay pipeline.
//!
//! - `run_relay`: check collaborators, then run poller and publisher until shutdown
//! - `Coordinator`: task wiring and ordered shutdown
//! - `StreamPoller` / `Publisher`: the two long-running tasks
//! - `ConnectionManager`: the single stream connection

pub mod connection;
pub mod coordinator;
pub mod decode;
pub mod poller;
pub mod publisher;
pub mod relay;

pub use connection::{ConnectionHandle, ConnectionManager, StreamConnection};
pub use coordinator::{Coordinator, ShutdownState, termination_signal};
pub use poller::{PollerStopped, StreamPoller};
pub use publisher::{PublishStats, Publisher};
pub use relay::{Collaborators, run_relay};
