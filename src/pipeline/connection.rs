//! Ownership of the single stream connection.
//!
//! Every poll goes through [`ConnectionManager::connect`], which closes the
//! previous connection before dialing. Any task may call
//! [`ConnectionManager::teardown`] to sever the live connection; a request
//! still dialing fails, and a body read in progress returns end-of-stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::StreamConfig;
use crate::utils::{dial_target, http};

/// Close handle for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    token: CancellationToken,
}

impl ConnectionHandle {
    fn new(id: u64) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Close the connection. Closing twice is a no-op.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Owns the stream connection; at most one is open at any time.
pub struct ConnectionManager {
    client: reqwest::Client,
    current: Mutex<Option<ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        Ok(Self::new(http::create_client(config)?))
    }

    /// Client for building requests. Send them through [`Self::connect`].
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn slot(&self) -> MutexGuard<'_, Option<ConnectionHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the current handle, if any, and install a fresh one.
    fn open_handle(&self) -> ConnectionHandle {
        let mut slot = self.slot();
        if let Some(previous) = slot.take() {
            previous.close();
        }
        let handle = ConnectionHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        *slot = Some(handle.clone());
        handle
    }

    /// Drop `handle` from the slot if it is still the current one.
    fn release(&self, handle: &ConnectionHandle) {
        handle.close();
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|current| current.id == handle.id) {
            *slot = None;
        }
    }

    /// Send `request` on a new connection, closing any previous one first.
    pub async fn connect(&self, request: reqwest::Request) -> Result<StreamConnection> {
        let target = dial_target(request.url());
        let handle = self.open_handle();
        log::debug!("Dialing {} (connection #{})", target, handle.id);

        let response = tokio::select! {
            biased;
            _ = handle.token.cancelled() => {
                self.release(&handle);
                return Err(AppError::dial(&target, "connection torn down while dialing"));
            }
            result = self.client.execute(request) => match result {
                Ok(response) => response,
                Err(e) => {
                    self.release(&handle);
                    return Err(AppError::dial(&target, e));
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            self.release(&handle);
            return Err(AppError::Status {
                status: status.as_u16(),
            });
        }

        Ok(StreamConnection { handle, response })
    }

    /// Close the current connection and its response reader. Idempotent.
    pub fn teardown(&self) {
        if let Some(handle) = self.slot().take() {
            if !handle.is_closed() {
                log::debug!("Tearing down connection #{}", handle.id);
            }
            handle.close();
        }
    }

    /// Whether a connection is currently open.
    pub fn is_live(&self) -> bool {
        self.slot().as_ref().is_some_and(|handle| !handle.is_closed())
    }

    /// Handle of the current connection, open or not.
    #[cfg(test)]
    fn current(&self) -> Option<ConnectionHandle> {
        self.slot().clone()
    }
}

/// An open stream response.
///
/// Closed when dropped, when replaced by a newer connection, or on teardown.
pub struct StreamConnection {
    handle: ConnectionHandle,
    response: reqwest::Response,
}

impl StreamConnection {
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Append the next body chunk to `buffer`.
    ///
    /// Returns `false` once the body is exhausted or the connection was closed.
    pub async fn read_into(&mut self, buffer: &mut Vec<u8>) -> Result<bool> {
        tokio::select! {
            biased;
            _ = self.handle.token.cancelled() => Ok(false),
            chunk = self.response.chunk() => match chunk? {
                Some(bytes) => {
                    buffer.extend_from_slice(&bytes);
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.handle.close();
    }
}
