//! The host's dedicated thread and message loop.

use std::{collections::VecDeque, io, panic::AssertUnwindSafe, thread};

use futures::FutureExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Host, HostError};
use crate::protocol::{Envelope, Reply, Request, ResponseData};

/// The thread a host runs on.
///
/// The host exits once every sender of its inbox is dropped, after finishing
/// the message in progress.
#[derive(Debug)]
pub struct HostHandle {
    thread: Option<thread::JoinHandle<()>>,
}

impl HostHandle {
    /// Wait for the thread to exit. Close the inbox first.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            crate::log!("host"; "worker thread panicked during shutdown");
        }
    }
}

/// Start `host` on its own thread, reading `inbox` and answering on `replies`.
pub fn spawn(
    host: Host,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    replies: mpsc::UnboundedSender<Reply>,
) -> io::Result<HostHandle> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let thread = thread::Builder::new()
        .name("compiler-host".into())
        .spawn(move || runtime.block_on(serve(host, inbox, replies)))?;

    Ok(HostHandle {
        thread: Some(thread),
    })
}

type Outcome = Result<ResponseData, String>;

/// The host's message loop. Returns once the inbox is closed and drained.
pub async fn serve(
    mut host: Host,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    replies: mpsc::UnboundedSender<Reply>,
) {
    let mut backlog = VecDeque::new();

    loop {
        let envelope = match backlog.pop_front() {
            Some(envelope) => envelope,
            None => match rx.recv().await {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let Envelope { id, request } = envelope;
        let kind = request.kind();
        crate::debug!("host"; "{} {}", kind, id);

        let (ids, outcome) = match request {
            Request::Init(data) => {
                init_with_joiners(&mut host, data.fonts, id, &mut rx, &mut backlog).await
            }
            request => (vec![id], guarded(host.handle(request)).await),
        };

        if let Err(err) = &outcome {
            crate::debug!("host"; "{} failed: {}", kind, err);
        }
        for id in ids {
            let reply = match &outcome {
                Ok(data) => Reply::ok(id, data.clone()),
                Err(err) => Reply::err(id, err.clone()),
            };
            if replies.send(reply).is_err() {
                return;
            }
        }
    }
}

/// Run one init while absorbing every other init that arrives meanwhile.
///
/// All of them share the outcome. Other requests are deferred to `backlog`.
async fn init_with_joiners(
    host: &mut Host,
    fonts: Vec<std::sync::Arc<[u8]>>,
    id: Uuid,
    rx: &mut mpsc::UnboundedReceiver<Envelope>,
    backlog: &mut VecDeque<Envelope>,
) -> (Vec<Uuid>, Outcome) {
    let mut ids = vec![id];
    let init = guarded(host.init(fonts));
    tokio::pin!(init);

    let outcome = loop {
        tokio::select! {
            biased;

            Some(next) = rx.recv() => match next.request {
                Request::Init(_) => ids.push(next.id),
                _ => backlog.push_back(next),
            },
            outcome = &mut init => break outcome,
        }
    };
    (ids, outcome)
}

/// Await a handler, turning errors and panics into reply messages.
async fn guarded<F>(handler: F) -> Outcome
where
    F: Future<Output = Result<ResponseData, HostError>>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(Ok(data)) => Ok(data),
        Ok(Err(err)) => Err(format!("{:#}", anyhow::Error::from(err))),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("compiler panicked: {detail}"),
        None => "compiler panicked".into(),
    }
}
