//! Message queue producers.
//!
//! [`NsqProducer`] publishes to a single nsqd through `tokio-nsq`. Every
//! publish waits for nsqd's acknowledgement, bounded by the publish timeout.
//! A producer that timed out or went unhealthy may still deliver a stale
//! acknowledgement, so it is dropped and rebuilt on the next publish.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_nsq::{NSQEvent, NSQProducer, NSQProducerConfig, NSQTopic};

use crate::error::{AppError, Result};

/// Producer side of a message queue.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish one message to `topic`.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Close the producer. Further publishes may fail.
    async fn stop(&self);
}

/// Whether nsqd would accept `topic` as a topic name.
pub fn is_valid_topic(topic: &str) -> bool {
    NSQTopic::new(topic).is_some()
}

/// Producer for a single nsqd instance.
pub struct NsqProducer {
    address: String,
    timeout: Duration,
    producer: tokio::sync::Mutex<Option<NSQProducer>>,
}

impl NsqProducer {
    /// Connect to nsqd, failing if it is not healthy within `timeout`.
    pub async fn connect(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let address = address.into();
        let producer = Self::open(&address, timeout).await?;
        log::info!("Connected to nsqd at {}", address);
        Ok(Self {
            address,
            timeout,
            producer: tokio::sync::Mutex::new(Some(producer)),
        })
    }

    async fn open(address: &str, timeout: Duration) -> Result<NSQProducer> {
        let mut producer = NSQProducerConfig::new(address).build();
        match tokio::time::timeout(timeout, wait_healthy(&mut producer)).await {
            Ok(result) => result.map(|()| producer),
            Err(_) => Err(AppError::queue(format!(
                "nsqd at {address} not reachable within {} ms",
                timeout.as_millis()
            ))),
        }
    }
}

async fn wait_healthy(producer: &mut NSQProducer) -> Result<()> {
    loop {
        match producer.consume().await {
            Some(NSQEvent::Healthy()) => return Ok(()),
            Some(NSQEvent::Unhealthy()) => log::debug!("nsqd not ready yet"),
            Some(_) => {}
            None => return Err(AppError::queue("producer closed while connecting")),
        }
    }
}

async fn wait_ack(producer: &mut NSQProducer) -> Result<()> {
    loop {
        match producer.consume().await {
            Some(NSQEvent::Ok()) => return Ok(()),
            Some(NSQEvent::Unhealthy()) => {
                return Err(AppError::queue("connection to nsqd lost"));
            }
            Some(_) => {}
            None => return Err(AppError::queue("producer closed")),
        }
    }
}

#[async_trait]
impl MessageQueue for NsqProducer {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let topic = NSQTopic::new(topic)
            .ok_or_else(|| AppError::queue(format!("invalid topic '{topic}'")))?;

        let mut guard = self.producer.lock().await;
        let producer = match guard.take() {
            Some(producer) => producer,
            None => {
                log::info!("Reconnecting to nsqd at {}", self.address);
                Self::open(&self.address, self.timeout).await?
            }
        };
        let producer = guard.insert(producer);

        let result = match producer.publish(&topic, payload.to_vec()).await {
            Ok(()) => match tokio::time::timeout(self.timeout, wait_ack(producer)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::queue(format!(
                    "no acknowledgement from nsqd within {} ms",
                    self.timeout.as_millis()
                ))),
            },
            Err(e) => Err(AppError::queue(e)),
        };

        if result.is_err() {
            *guard = None;
        }
        result
    }

    async fn stop(&self) {
        self.producer.lock().await.take();
        log::info!("Producer for {} stopped", self.address);
    }
}

/// In-process queue that records everything published to it.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Mutex<MemoryQueueState>>,
}

#[derive(Debug, Default)]
struct MemoryQueueState {
    messages: Vec<(String, Vec<u8>)>,
    failures_left: usize,
    stopped: bool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue whose first `count` publishes fail.
    pub fn failing_first(count: usize) -> Self {
        let queue = Self::new();
        queue.state().failures_left = count;
        queue
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryQueueState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Published (topic, payload) pairs in publish order.
    pub fn messages(&self) -> Vec<(String, Vec<u8>)> {
        self.state().messages.clone()
    }

    /// Published payloads decoded as UTF-8.
    pub fn payloads(&self) -> Vec<String> {
        self.state()
            .messages
            .iter()
            .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.state().stopped
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.stopped {
            return Err(AppError::queue("queue stopped"));
        }
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(AppError::queue("injected failure"));
        }
        state.messages.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn stop(&self) {
        self.state().stopped = true;
    }
}
