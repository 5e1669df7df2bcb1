//! Request/response plumbing for the agent.
//!
//! - [`PendingSlot`] holds the single outstanding request of one kind
//!   (an invitation or a player list) until the lobby answers it.
//! - [`Reply`] is the caller's end of such a request.
//! - [`Inbox`] queues messages that arrive unasked.
//!
//! A slot accepts a new request only when it is idle or when the previous
//! caller dropped its [`Reply`]; otherwise [`PendingSlot::arm`] fails with
//! [`AgentError::AlreadyPending`].  Answers that arrive with nothing pending
//! are discarded.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::AgentError;

/// The caller's end of a request.  Resolves once.
#[derive(Debug)]
pub struct Reply<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Reply<T> {
    /// Waits for the answer.
    ///
    /// # Errors
    ///
    /// [`AgentError::Closed`] if the connection ended first.
    pub async fn wait(self) -> Result<T, AgentError> {
        self.rx.await.map_err(|_| AgentError::Closed)
    }
}

#[derive(Debug)]
enum SlotState<T> {
    Idle,
    Waiting(oneshot::Sender<T>),
    Closed,
}

/// One outstanding request of a given kind.
#[derive(Debug)]
pub(crate) struct PendingSlot<T> {
    kind: &'static str,
    state: Mutex<SlotState<T>>,
}

impl<T> PendingSlot<T> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: Mutex::new(SlotState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new request and returns its reply.
    pub(crate) fn arm(&self) -> Result<Reply<T>, AgentError> {
        let mut state = self.lock();
        match &*state {
            SlotState::Closed => return Err(AgentError::Closed),
            SlotState::Waiting(tx) if !tx.is_closed() => {
                return Err(AgentError::AlreadyPending(self.kind))
            }
            SlotState::Waiting(_) | SlotState::Idle => {}
        }
        let (tx, rx) = oneshot::channel();
        *state = SlotState::Waiting(tx);
        Ok(Reply { rx })
    }

    /// Resolves the outstanding request.  Returns `false` if nobody was waiting.
    pub(crate) fn fulfill(&self, value: T) -> bool {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::Idle) {
            SlotState::Waiting(tx) => tx.send(value).is_ok(),
            SlotState::Idle => {
                debug!("unsolicited {} answer dropped", self.kind);
                false
            }
            SlotState::Closed => {
                *state = SlotState::Closed;
                false
            }
        }
    }

    /// Fails the outstanding request and every later one.
    pub(crate) fn close(&self) {
        *self.lock() = SlotState::Closed;
    }
}

/// A queue of unsolicited messages.  Several tasks may wait on it; each
/// message goes to exactly one of them.
#[derive(Debug)]
pub struct Inbox<T> {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> Inbox<T> {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx: tokio::sync::Mutex::new(rx),
            },
        )
    }

    /// Waits for the next message.  `None` once the connection is gone and the
    /// queue is drained.
    pub async fn next(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Takes a queued message without waiting.
    pub fn try_next(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
