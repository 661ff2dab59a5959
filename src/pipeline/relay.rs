// src/pipeline/relay.rs

//! Relay entry point: startup checks and task wiring.

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::connection::ConnectionManager;
use crate::pipeline::coordinator::Coordinator;
use crate::pipeline::poller::StreamPoller;
use crate::pipeline::publisher::{PublishStats, Publisher};
use crate::services::{
    FileKeywordStore, KeywordSource, MessageQueue, NsqProducer, OAuth1Signer, RequestSigner,
    Unsigned,
};

/// External collaborators the relay runs against.
pub struct Collaborators {
    pub keywords: Arc<dyn KeywordSource>,
    pub signer: Arc<dyn RequestSigner>,
    pub queue: Arc<dyn MessageQueue>,
}

impl Collaborators {
    /// Build the configured collaborators, connecting to the queue.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let keywords = Arc::new(FileKeywordStore::new(&config.keywords.path));

        let signer: Arc<dyn RequestSigner> = match OAuth1Signer::from_env()? {
            Some(signer) => Arc::new(signer),
            None => {
                log::warn!("No stream credentials configured; sending unsigned requests");
                Arc::new(Unsigned)
            }
        };

        let queue = Arc::new(
            NsqProducer::connect(&config.queue.address, config.queue.publish_timeout()).await?,
        );

        Ok(Self {
            keywords,
            signer,
            queue,
        })
    }
}

/// Run the relay until `shutdown` resolves.
///
/// Fails before starting any task if the keyword store cannot be read.
pub async fn run_relay<F>(
    config: &Config,
    collaborators: Collaborators,
    shutdown: F,
) -> Result<PublishStats>
where
    F: Future<Output = ()> + Send + 'static,
{
    let keywords = collaborators.keywords.load().await?;
    log::info!(
        "Keyword store {} holds {} keywords",
        collaborators.keywords.describe(),
        keywords.len()
    );

    let connections = Arc::new(ConnectionManager::from_config(&config.stream)?);
    let poller = StreamPoller::new(
        collaborators.keywords,
        collaborators.signer,
        Arc::clone(&connections),
        &config.stream.url,
        config.stream.poll_interval(),
    );
    let publisher = Publisher::new(collaborators.queue, &config.queue.topic);

    log::info!(
        "Relaying matches from {} to topic '{}' every {}s",
        config.stream.url,
        config.queue.topic,
        config.stream.poll_interval_secs
    );

    Coordinator::new(
        poller,
        publisher,
        connections,
        config.stream.reset_interval(),
        config.pipeline.channel_capacity,
    )
    .run(shutdown)
    .await
}
