//! Request/reply correlation with the compiler host.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::GatewayError;
use crate::protocol::{Envelope, Reply, Request, ResponseData};

type Pending = Arc<DashMap<Uuid, oneshot::Sender<Reply>>>;

/// Posts envelopes to the host and routes replies back by id.
pub(crate) struct Broker {
    outbox: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    pending: Pending,
}

impl Broker {
    /// Must be called inside a tokio runtime; spawns the reply router.
    pub fn new(
        outbox: mpsc::UnboundedSender<Envelope>,
        replies: mpsc::UnboundedReceiver<Reply>,
    ) -> Self {
        let pending = Pending::default();
        tokio::spawn(route(replies, pending.clone()));
        Self {
            outbox: Mutex::new(Some(outbox)),
            pending,
        }
    }

    /// Send `request` and wait up to `timeout` for its reply.
    ///
    /// The pending entry is removed however the call ends, including when
    /// the caller drops the future.
    pub async fn call(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<ResponseData, GatewayError> {
        let kind = request.kind();
        let envelope = Envelope::new(request);
        let (tx, rx) = oneshot::channel();

        self.pending.insert(envelope.id, tx);
        let _entry = PendingEntry {
            pending: &self.pending,
            id: envelope.id,
        };
        self.post(envelope)?;

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(GatewayError::Timeout {
                kind,
                after: timeout,
            }),
            Ok(Err(_)) => Err(GatewayError::Closed),
            Ok(Ok(reply)) => reply.into_result().map_err(GatewayError::Host),
        }
    }

    fn post(&self, envelope: Envelope) -> Result<(), GatewayError> {
        let outbox = self.outbox.lock();
        let sender = outbox.as_ref().ok_or(GatewayError::Closed)?;
        sender.send(envelope).map_err(|_| GatewayError::Closed)
    }

    /// Close the host's inbox. Calls already posted still get their replies.
    pub fn close(&self) {
        self.outbox.lock().take();
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

struct PendingEntry<'a> {
    pending: &'a Pending,
    id: Uuid,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

async fn route(mut replies: mpsc::UnboundedReceiver<Reply>, pending: Pending) {
    while let Some(reply) = replies.recv().await {
        match pending.remove(&reply.id) {
            Some((_, waiter)) => {
                waiter.send(reply).ok();
            }
            None => crate::debug!("gateway"; "dropping late reply {}", reply.id),
        }
    }
    // host exited: wake every caller with `Closed`
    pending.clear();
}
