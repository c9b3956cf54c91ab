//! Server dispatch loop
//!
//! One cooperative loop owns the [`MatchState`]: tick the current phase,
//! flush queued broadcasts, wait (bounded) for one message, validate it and
//! hand it to its handler. Nothing else touches the state, so no locking.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::net::protocol::{self, ClientMsg, Identity};
use crate::net::transport::{Datagram, Transport, TransportError};

use super::r#match::MatchState;

/// Faults raised while processing a single message or broadcast
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("handler for {kind} from {sender} panicked: {reason}")]
    HandlerPanicked {
        kind: &'static str,
        sender: Identity,
        reason: String,
    },

    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: &'static str,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Run one message handler, turning a panic into [`ServerError::HandlerPanicked`]
pub fn isolate<R>(
    kind: &'static str,
    sender: &Identity,
    handler: impl FnOnce() -> R,
) -> Result<R, ServerError> {
    panic::catch_unwind(AssertUnwindSafe(handler)).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown".to_string());
        ServerError::HandlerPanicked {
            kind,
            sender: sender.clone(),
            reason,
        }
    })
}

/// The authoritative arena server
pub struct GameServer<T> {
    state: MatchState,
    transport: T,
    poll_timeout: Duration,
}

impl<T: Transport> GameServer<T> {
    pub fn new(transport: T, state: MatchState) -> Self {
        let poll_timeout = state.timings().poll;
        Self {
            state,
            transport,
            poll_timeout,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Run the dispatch loop until the task is dropped
    pub async fn run(mut self) {
        info!(phase = %self.state.phase(), "Arena server running");
        loop {
            self.step().await;
        }
    }

    /// One loop iteration: tick, flush, receive, dispatch, flush
    pub async fn step(&mut self) {
        // Perform maintenance work.
        self.state.tick(Instant::now());
        self.flush().await;

        // Timeouts just let the loop come round to tick again.
        let Datagram { peer, payload } = match self.transport.recv(self.poll_timeout).await {
            Ok(Some(datagram)) => datagram,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Discarding undeliverable datagram");
                return;
            }
        };

        let msg = match protocol::decode::<ClientMsg>(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(identity = %peer, error = %e, "Discarding invalid message");
                return;
            }
        };

        debug!(identity = %peer, kind = msg.kind(), "Received message");

        if let Err(e) = self.dispatch(peer, msg) {
            error!(error = %e, "Message handling failed, continuing");
        }

        self.flush().await;
    }

    /// Invoke the handler inside a failure boundary
    fn dispatch(&mut self, sender: Identity, msg: ClientMsg) -> Result<(), ServerError> {
        let kind = msg.kind();
        let state = &mut self.state;
        let peer = sender.clone();
        isolate(kind, &peer, move || state.handle(sender, msg))
    }

    /// Send everything the state queued
    async fn flush(&mut self) {
        for outbound in self.state.drain_outbox() {
            let kind = outbound.msg.kind();
            let payload = match protocol::encode(&outbound.msg) {
                Ok(payload) => payload,
                Err(source) => {
                    let e = ServerError::Encode { kind, source };
                    error!(error = %e, "Dropping broadcast");
                    continue;
                }
            };

            for recipient in &outbound.recipients {
                debug!(identity = %recipient, kind, bytes = payload.len(), "Sending message");
                if let Err(e) = self.transport.send(recipient, &payload).await {
                    warn!(identity = %recipient, error = %ServerError::from(e), "Send failed");
                }
            }
        }
    }
}
