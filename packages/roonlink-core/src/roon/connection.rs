//! Request correlation for one Core connection.
//!
//! Outbound frames go to the connection's writer task through a bounded
//! channel. Each request gets the next Request-Id and a [`Responder`] that
//! decides what happens to the Core's reply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

use super::moo::MooMessage;
use crate::error::{CoreError, CoreResult};

enum Responder {
    /// Awaited by a caller.
    Waiter(oneshot::Sender<MooMessage>),
    /// Fire-and-forget; the reply is only logged.
    Logged(String),
    /// Long-lived subscription; replies go back to the session's event loop.
    Subscription,
}

pub(crate) struct CoreLink {
    outbound: mpsc::Sender<Vec<u8>>,
    next_request_id: AtomicU64,
    pending: Mutex<HashMap<u64, Responder>>,
    request_timeout: Duration,
}

impl CoreLink {
    pub(crate) fn new(outbound: mpsc::Sender<Vec<u8>>, request_timeout: Duration) -> Self {
        Self {
            outbound,
            next_request_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            request_timeout,
        }
    }

    fn enqueue(&self, msg: &MooMessage) -> CoreResult<()> {
        self.outbound.try_send(msg.encode()).map_err(|e| match e {
            TrySendError::Full(_) => {
                CoreError::ServiceUnavailable("outbound queue to Core is full".into())
            }
            TrySendError::Closed(_) => {
                CoreError::ServiceUnavailable("connection to Core closed".into())
            }
        })
    }

    fn register(&self, responder: Responder) -> u64 {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(id, responder);
        id
    }

    fn send(&self, name: &str, body: Option<&Value>, responder: Responder) -> CoreResult<u64> {
        let id = self.register(responder);
        if let Err(e) = self.enqueue(&MooMessage::request(id, name, body)) {
            self.pending.lock().remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Sends a request and waits for its first reply, bounded by the request timeout.
    pub(crate) async fn request(&self, name: &str, body: Option<&Value>) -> CoreResult<MooMessage> {
        let (tx, rx) = oneshot::channel();
        let id = self.send(name, body, Responder::Waiter(tx))?;
        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(CoreError::ServiceUnavailable(
                "connection to Core closed".into(),
            )),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CoreError::Timeout(name.to_string()))
            }
        }
    }

    /// Sends a request and waits for its reply without a deadline.
    ///
    /// Used for registration, which completes only once the user enables the
    /// extension in Roon.
    pub(crate) async fn request_unbounded(
        &self,
        name: &str,
        body: Option<&Value>,
    ) -> CoreResult<MooMessage> {
        let (tx, rx) = oneshot::channel();
        self.send(name, body, Responder::Waiter(tx))?;
        rx.await
            .map_err(|_| CoreError::ServiceUnavailable("connection to Core closed".into()))
    }

    /// Queues a request whose reply is only logged. `what` describes it in the log.
    pub(crate) fn post(&self, name: &str, body: Option<&Value>, what: String) -> CoreResult<()> {
        self.send(name, body, Responder::Logged(what)).map(|_| ())
    }

    /// Starts a subscription; every reply comes back out of [`CoreLink::route`].
    pub(crate) fn subscribe(&self, name: &str, body: Option<&Value>) -> CoreResult<u64> {
        self.send(name, body, Responder::Subscription)
    }

    /// Answers a request the Core made to us.
    pub(crate) fn reply(&self, msg: &MooMessage) -> CoreResult<()> {
        self.enqueue(msg)
    }

    /// Delivers a `COMPLETE`/`CONTINUE` from the Core to whoever is waiting for it.
    ///
    /// Subscription replies are handed back to the caller.
    pub(crate) fn route(&self, msg: MooMessage) -> Option<MooMessage> {
        let responder = {
            let mut pending = self.pending.lock();
            if matches!(pending.get(&msg.request_id), Some(Responder::Subscription)) {
                return Some(msg);
            }
            pending.remove(&msg.request_id)
        };

        match responder {
            Some(Responder::Waiter(tx)) => {
                // Receiver gone means the caller timed out; nothing to do.
                let _ = tx.send(msg);
            }
            Some(Responder::Logged(what)) => {
                if msg.is_success() {
                    log::debug!("[Session] Core completed {}", what);
                } else {
                    log::warn!("[Session] Core answered {} for {}", msg.name, what);
                }
            }
            Some(Responder::Subscription) => {}
            None => {
                log::debug!(
                    "[Session] Reply {} {} for unknown request {}",
                    msg.verb,
                    msg.name,
                    msg.request_id
                );
            }
        }
        None
    }

    /// Drops every pending responder; awaiting callers see the connection as closed.
    pub(crate) fn fail_all(&self) {
        self.pending.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
