//! Request correlation table.
//!
//! DESIGN
//! ======
//! Maps request id -> the one-shot completion for the caller awaiting it.
//! Every completion path (reply, remote error, timeout, drain) goes through
//! `take`, which removes the entry under the lock. Whoever removes the entry
//! owns the only `oneshot::Sender`, so a call completes at most once and late
//! or duplicate replies find nothing and are dropped.
//!
//! Timers are plain spawned sleeps that call back into the table; a timer
//! that loses the race to a reply finds its entry gone and does nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use frames::Payload;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::ClientError;

pub type CallResult = Result<Payload, ClientError>;

struct PendingCall {
    kind: String,
    reply: oneshot::Sender<CallResult>,
    timer: Option<JoinHandle<()>>,
}

impl PendingCall {
    fn complete(mut self, outcome: CallResult) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.reply.send(outcome);
    }
}

#[derive(Clone, Default)]
pub struct PendingTable {
    inner: Arc<Mutex<HashMap<String, PendingCall>>>,
}

impl PendingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and return the receiver its outcome arrives on.
    ///
    /// A `timeout_secs` of zero registers no timer. Must be called from
    /// within a tokio runtime when a timer is requested.
    pub fn register(
        &self,
        request_id: &str,
        kind: &str,
        timeout_secs: u64,
    ) -> oneshot::Receiver<CallResult> {
        let (reply, rx) = oneshot::channel();
        let timer = (timeout_secs > 0).then(|| {
            let table = self.clone();
            let request_id = request_id.to_owned();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
                table.expire(&request_id, timeout_secs);
            })
        });

        let previous = self.lock().insert(
            request_id.to_owned(),
            PendingCall {
                kind: kind.to_owned(),
                reply,
                timer,
            },
        );
        debug_assert!(previous.is_none(), "request id {request_id} registered twice");
        rx
    }

    /// Complete `request_id` with a reply payload. Returns `false` when the
    /// id is unknown (already settled, timed out, or never registered).
    pub fn resolve(&self, request_id: &str, payload: Payload) -> bool {
        self.settle(request_id, |_| Ok(payload))
    }

    /// Fail `request_id` with a remote error message.
    pub fn reject(&self, request_id: &str, message: String) -> bool {
        self.settle(request_id, |kind| {
            Err(ClientError::Remote {
                request_id: request_id.to_owned(),
                kind,
                message,
            })
        })
    }

    /// Fail every outstanding call with the error built by `reason`.
    /// Returns how many calls were drained.
    pub fn drain_all(&self, reason: impl Fn() -> ClientError) -> usize {
        let drained: Vec<PendingCall> = self.lock().drain().map(|(_, call)| call).collect();
        let count = drained.len();
        for call in drained {
            call.complete(Err(reason()));
        }
        count
    }

    #[must_use]
    pub fn contains(&self, request_id: &str) -> bool {
        self.lock().contains_key(request_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop an entry without completing it, e.g. when the send never left.
    pub(crate) fn forget(&self, request_id: &str) {
        if let Some(mut call) = self.take(request_id) {
            if let Some(timer) = call.timer.take() {
                timer.abort();
            }
        }
    }

    fn settle(&self, request_id: &str, outcome: impl FnOnce(String) -> CallResult) -> bool {
        let Some(mut call) = self.take(request_id) else {
            return false;
        };
        let kind = std::mem::take(&mut call.kind);
        call.complete(outcome(kind));
        true
    }

    fn expire(&self, request_id: &str, timeout_secs: u64) {
        let Some(mut call) = self.take(request_id) else {
            return;
        };
        // This runs on the timer task itself; don't abort it.
        call.timer = None;
        tracing::warn!(%request_id, kind = %call.kind, timeout_secs, "request timed out");
        let error = ClientError::Timeout {
            request_id: request_id.to_owned(),
            kind: std::mem::take(&mut call.kind),
            timeout_secs,
        };
        call.complete(Err(error));
    }

    fn take(&self, request_id: &str) -> Option<PendingCall> {
        self.lock().remove(request_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingCall>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "pending_test.rs"]
mod tests;
