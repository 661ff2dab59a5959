//! Collaborators the pipeline talks to.
//!
//! This module contains the boundaries to:
//! - The keyword store (`KeywordSource`, `FileKeywordStore`)
//! - Stream request signing (`RequestSigner`, `OAuth1Signer`)
//! - The message queue (`MessageQueue`, `NsqProducer`)

pub mod keywords;
pub mod queue;
pub mod signer;

pub use keywords::{FileKeywordStore, KeywordSource};
pub use queue::{MemoryQueue, MessageQueue, NsqProducer};
pub use signer::{FilterParams, OAuth1Signer, RequestSigner, Unsigned};
