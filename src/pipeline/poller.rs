//! Stream poller task.
//!
//! Each cycle loads the keyword set, opens the stream filtered by those
//! keywords, and emits one [`MatchEvent`] per (item, matching keyword).
//! Any failure ends the cycle early; the next one starts after the poll
//! interval regardless of how many cycles failed before it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{CycleStats, KeywordSet, MatchEvent};
use crate::pipeline::connection::ConnectionManager;
use crate::pipeline::decode::{Decoded, ItemDecoder};
use crate::services::{FilterParams, KeywordSource, RequestSigner};

/// Sent once when the poller leaves its loop.
///
/// Carries the poller's only sender so that closing the match channel is
/// left to whoever receives this.
#[derive(Debug)]
pub struct PollerStopped {
    pub output: mpsc::Sender<MatchEvent>,
    pub cycles: u64,
}

/// Polls the stream source and emits keyword matches.
pub struct StreamPoller {
    keywords: Arc<dyn KeywordSource>,
    signer: Arc<dyn RequestSigner>,
    connections: Arc<ConnectionManager>,
    stream_url: String,
    poll_interval: Duration,
}

impl StreamPoller {
    pub fn new(
        keywords: Arc<dyn KeywordSource>,
        signer: Arc<dyn RequestSigner>,
        connections: Arc<ConnectionManager>,
        stream_url: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            keywords,
            signer,
            connections,
            stream_url: stream_url.into(),
            poll_interval,
        }
    }

    /// Poll until `stop` is cancelled, then report on `stopped`.
    ///
    /// Within a cycle the stop request is honoured before dialing and while
    /// waiting on the network. Events already matched are still sent.
    pub async fn run(
        self,
        stop: CancellationToken,
        output: mpsc::Sender<MatchEvent>,
        stopped: oneshot::Sender<PollerStopped>,
    ) {
        let mut cycles = 0u64;

        loop {
            if stop.is_cancelled() {
                break;
            }

            match self.poll_once(&stop, &output).await {
                Ok(stats) => log::info!(
                    "Poll cycle {} done: {} items, {} matches for {} keywords in {} ms",
                    cycles + 1,
                    stats.item_count,
                    stats.event_count,
                    stats.keyword_count,
                    stats.elapsed_ms()
                ),
                Err(e) => log::warn!("Poll cycle {} aborted: {}", cycles + 1, e),
            }
            cycles += 1;

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        log::info!("Poller stopping after {} cycles", cycles);
        if stopped.send(PollerStopped { output, cycles }).is_err() {
            log::warn!("Nobody is waiting for the poller to stop");
        }
    }

    /// Run one fetch-and-match cycle.
    pub async fn poll_once(
        &self,
        stop: &CancellationToken,
        output: &mpsc::Sender<MatchEvent>,
    ) -> Result<CycleStats> {
        let keywords = self.keywords.load().await?;
        let mut stats = CycleStats::started(keywords.len());
        if keywords.is_empty() {
            log::info!(
                "No keywords in {}; skipping fetch",
                self.keywords.describe()
            );
            return Ok(stats.finish());
        }

        // A stop that arrived while loading found no connection to tear down.
        if stop.is_cancelled() {
            log::debug!("Stop requested before dialing");
            return Ok(stats.finish());
        }

        let request = self.build_request(&keywords)?;
        let mut connection = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                self.connections.teardown();
                return Ok(stats.finish());
            }
            result = self.connections.connect(request) => result?,
        };
        log::debug!(
            "Streaming {} keywords on connection #{}",
            keywords.len(),
            connection.handle().id()
        );

        let mut decoder = ItemDecoder::new();
        'stream: loop {
            loop {
                match decoder.next_item() {
                    Decoded::Item(item) => {
                        stats.item_count += 1;
                        for keyword in keywords.matches(&item.text) {
                            output
                                .send(MatchEvent::new(keyword))
                                .await
                                .map_err(|_| AppError::ChannelClosed)?;
                            stats.event_count += 1;
                        }
                    }
                    Decoded::NeedMore => break,
                    Decoded::Invalid(e) => {
                        log::debug!("Stream decoding stopped: {}", e);
                        break 'stream;
                    }
                }
            }

            let read = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                read = connection.read_into(decoder.buffer_mut()) => read,
            };
            match read {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    log::debug!("Stream read stopped: {}", e);
                    break;
                }
            }
        }

        Ok(stats.finish())
    }

    fn build_request(&self, keywords: &KeywordSet) -> Result<reqwest::Request> {
        let track = keywords.track_param();
        let params = FilterParams { track: &track };
        let builder = self
            .connections
            .client()
            .post(&self.stream_url)
            .form(&[("track", params.track)]);
        Ok(self
            .signer
            .sign(builder, &self.stream_url, &params)?
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::models::StreamConfig;
    use crate::services::Unsigned;

    struct FixedKeywords(Mutex<Option<KeywordSet>>);

    impl FixedKeywords {
        fn new(options: &[&str]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Some(KeywordSet::new(
                options.iter().copied(),
            )))))
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self(Mutex::new(None)))
        }
    }

    #[async_trait]
    impl KeywordSource for FixedKeywords {
        async fn load(&self) -> Result<KeywordSet> {
            self.0
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::keyword_store("fixed", "unavailable"))
        }

        fn describe(&self) -> String {
            "fixed".into()
        }
    }

    /// Read request head and body (by Content-Length).
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    /// Serve every connection the same body, then close it.
    async fn stream_server(body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{address}/filter.json"), requests)
    }

    fn poller(keywords: Arc<dyn KeywordSource>, url: &str) -> StreamPoller {
        let connections =
            Arc::new(ConnectionManager::from_config(&StreamConfig::default()).unwrap());
        StreamPoller::new(
            keywords,
            Arc::new(Unsigned),
            connections,
            url,
            Duration::from_millis(20),
        )
    }

    async fn drain(mut rx: mpsc::Receiver<MatchEvent>) -> Vec<String> {
        let mut keywords = Vec::new();
        while let Some(event) = rx.recv().await {
            keywords.push(event.keyword);
        }
        keywords
    }

    #[tokio::test]
    async fn emits_one_event_per_matching_keyword() {
        let (url, requests) = stream_server(
            "{\"text\":\"I love rust\"}\r\n{\"text\":\"go is nice\"}\r\n{\"text\":\"Rust or Go?\"}\r\n",
        )
        .await;
        let poller = poller(FixedKeywords::new(&["rust", "go"]), &url);

        let (tx, rx) = mpsc::channel(16);
        let stats = poller.poll_once(&CancellationToken::new(), &tx).await.unwrap();
        drop(tx);

        assert_eq!(stats.item_count, 3);
        assert_eq!(stats.event_count, 4);
        assert_eq!(drain(rx).await, vec!["rust", "go", "rust", "go"]);

        let request = requests.lock().unwrap()[0].clone();
        assert!(request.starts_with("POST /filter.json"));
        assert!(request.contains("track=rust%2Cgo"));
    }

    #[tokio::test]
    async fn decode_failure_ends_cycle_quietly() {
        let (url, _) = stream_server("{\"text\":\"rust\"}\n<html>oops</html>\n{\"text\":\"rust\"}\n").await;
        let poller = poller(FixedKeywords::new(&["rust"]), &url);

        let (tx, rx) = mpsc::channel(16);
        let stats = poller.poll_once(&CancellationToken::new(), &tx).await.unwrap();
        drop(tx);

        assert_eq!(stats.event_count, 1);
        assert_eq!(drain(rx).await, vec!["rust"]);
    }

    #[tokio::test]
    async fn keyword_failure_aborts_cycle() {
        let poller = poller(FixedKeywords::failing(), "http://127.0.0.1:9/unused");
        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            poller.poll_once(&CancellationToken::new(), &tx).await,
            Err(AppError::KeywordStore { .. })
        ));
    }

    #[tokio::test]
    async fn empty_keywords_skip_fetch() {
        let (url, requests) = stream_server("{\"text\":\"x\"}\n").await;
        let poller = poller(FixedKeywords::new(&[]), &url);
        let (tx, _rx) = mpsc::channel(1);

        let stats = poller.poll_once(&CancellationToken::new(), &tx).await.unwrap();
        assert_eq!(stats.item_count, 0);
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dial_error_keeps_polling() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);
        let poller = poller(
            FixedKeywords::new(&["rust"]),
            &format!("http://{address}/filter.json"),
        );

        let stop = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let (stopped_tx, stopped_rx) = oneshot::channel();
        let task = tokio::spawn(poller.run(stop.clone(), tx, stopped_tx));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!task.is_finished());
        stop.cancel();

        let stopped = stopped_rx.await.unwrap();
        assert!(stopped.cycles >= 2);
        drop(stopped);
        assert!(drain(rx).await.is_empty());
        task.await.unwrap();
    }

    /// Keyword source that requests a stop while loading.
    struct StopWhileLoading(CancellationToken);

    #[async_trait]
    impl KeywordSource for StopWhileLoading {
        async fn load(&self) -> Result<KeywordSet> {
            self.0.cancel();
            Ok(KeywordSet::new(["rust"]))
        }

        fn describe(&self) -> String {
            "stopping".into()
        }
    }

    #[tokio::test]
    async fn stop_during_keyword_load_skips_dial() {
        let (url, requests) = stream_server("{\"text\":\"rust\"}\n").await;
        let stop = CancellationToken::new();
        let poller = poller(Arc::new(StopWhileLoading(stop.clone())), &url);
        let (tx, _rx) = mpsc::channel(1);

        let stats = tokio::time::timeout(Duration::from_secs(5), poller.poll_once(&stop, &tx))
            .await
            .expect("cycle kept running after stop")
            .unwrap();

        assert_eq!(stats.item_count, 0);
        assert!(requests.lock().unwrap().is_empty());
        assert!(!poller.connections.is_live());
    }

    #[tokio::test]
    async fn stop_releases_a_hanging_read() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let body = "{\"text\":\"rust\"}\r\n";
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                });
            }
        });
        let poller = poller(
            FixedKeywords::new(&["rust"]),
            &format!("http://{address}/filter.json"),
        );

        let stop = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        let cycle = tokio::spawn({
            let stop = stop.clone();
            async move { poller.poll_once(&stop, &tx).await }
        });

        assert_eq!(rx.recv().await.unwrap().keyword, "rust");
        stop.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), cycle)
            .await
            .expect("read was not released by stop")
            .unwrap()
            .unwrap();
        assert_eq!(stats.event_count, 1);
    }

    #[tokio::test]
    async fn stop_before_start_runs_no_cycle() {
        let poller = poller(FixedKeywords::failing(), "http://127.0.0.1:9/unused");
        let stop = CancellationToken::new();
        stop.cancel();
        let (tx, _rx) = mpsc::channel(1);
        let (stopped_tx, stopped_rx) = oneshot::channel();

        poller.run(stop, tx, stopped_tx).await;
        assert_eq!(stopped_rx.await.unwrap().cycles, 0);
    }
}
