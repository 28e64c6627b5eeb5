//! Debounced single-flight scheduling for one request kind.
//!
//! ```text
//!            submit                 window elapsed
//!   Idle ───────────────> Waiting ─────────────────> InFlight
//!    ^                     │  ^ submit (cancel old)    │   │
//!    │                     └──┘                        │   │ submit
//!    │        settle                                   │   v
//!    └─────────────────────────────────────────────────┘ InFlightWaiting
//!                                                          │ submit (cancel old)
//!             settle: dispatch if its window elapsed, ─────┘
//!             otherwise back to Waiting
//! ```
//!
//! [`FlightState`] is the pure transition table; [`Flight`] drives it from a
//! tokio task and owns the timer.

use std::{future::Future, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep_until},
};

use super::GatewayError;

/// A submission parked until `due`.
#[derive(Debug)]
pub(crate) struct Pending<T> {
    pub item: T,
    pub due: Instant,
}

#[derive(Debug, Default)]
pub(crate) enum FlightState<T> {
    #[default]
    Idle,
    Waiting(Pending<T>),
    InFlight,
    InFlightWaiting(Pending<T>),
}

impl<T> FlightState<T> {
    /// Accept a new submission. Returns the submission it supersedes.
    pub fn submit(&mut self, item: T, now: Instant, window: Duration) -> Option<T> {
        let pending = Pending {
            item,
            due: now + window,
        };
        match std::mem::take(self) {
            Self::Idle => {
                *self = Self::Waiting(pending);
                None
            }
            Self::Waiting(old) => {
                *self = Self::Waiting(pending);
                Some(old.item)
            }
            Self::InFlight => {
                *self = Self::InFlightWaiting(pending);
                None
            }
            Self::InFlightWaiting(old) => {
                *self = Self::InFlightWaiting(pending);
                Some(old.item)
            }
        }
    }

    /// The timer fired. Returns the submission to dispatch, if it is due.
    pub fn fire(&mut self, now: Instant) -> Option<T> {
        match std::mem::take(self) {
            Self::Waiting(pending) if pending.due <= now => {
                *self = Self::InFlight;
                Some(pending.item)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// The in-flight request finished. Returns the waiting submission if it
    /// can be dispatched right away.
    pub fn settle(&mut self, now: Instant) -> Option<T> {
        match std::mem::take(self) {
            Self::InFlight => None,
            Self::InFlightWaiting(pending) if pending.due <= now => {
                *self = Self::InFlight;
                Some(pending.item)
            }
            Self::InFlightWaiting(pending) => {
                *self = Self::Waiting(pending);
                None
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// When the timer should fire next. Only `Waiting` arms it; a submission
    /// behind an in-flight request waits for [`settle`](Self::settle).
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Waiting(pending) => Some(pending.due),
            _ => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight | Self::InFlightWaiting(_))
    }

    /// Drop any parked submission, returning it.
    pub fn take_pending(&mut self) -> Option<T> {
        match std::mem::take(self) {
            Self::Waiting(pending) => Some(pending.item),
            Self::InFlightWaiting(pending) => {
                *self = Self::InFlight;
                Some(pending.item)
            }
            other => {
                *self = other;
                None
            }
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

type Answer<R> = oneshot::Sender<Result<R, GatewayError>>;

struct Submission<A, R> {
    args: A,
    answer: Answer<R>,
}

/// Handle to the scheduling task of one request kind.
pub(crate) struct Flight<A, R> {
    tx: mpsc::UnboundedSender<Submission<A, R>>,
}

impl<A, R> Flight<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Spawn the scheduler. `dispatch` performs the actual request.
    pub fn spawn<F, Fut>(kind: &'static str, window: Duration, dispatch: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, GatewayError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(kind, window, rx, dispatch));
        Self { tx }
    }

    /// Submit `args`; resolves with the result, or `Cancelled` if a newer
    /// call superseded this one before it was dispatched.
    pub async fn call(&self, args: A) -> Result<R, GatewayError> {
        let (answer, rx) = oneshot::channel();
        self.tx
            .send(Submission { args, answer })
            .map_err(|_| GatewayError::Closed)?;
        rx.await.map_err(|_| GatewayError::Closed)?
    }
}

async fn run<A, R, F, Fut>(
    kind: &'static str,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<Submission<A, R>>,
    dispatch: F,
) where
    A: Send + 'static,
    R: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, GatewayError>> + Send + 'static,
{
    let mut state: FlightState<Submission<A, R>> = FlightState::Idle;
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();

    let start = |submission: Submission<A, R>| {
        crate::debug!("flight"; "dispatch {}", kind);
        let request = dispatch(submission.args);
        let done = done_tx.clone();
        tokio::spawn(async move {
            let result = request.await;
            submission.answer.send(result).ok();
            done.send(()).ok();
        });
    };

    loop {
        let deadline = state.deadline();

        tokio::select! {
            submission = rx.recv() => {
                let Some(submission) = submission else { break };
                if let Some(old) = state.submit(submission, Instant::now(), window) {
                    crate::debug!("flight"; "{} superseded", kind);
                    old.answer.send(Err(GatewayError::Cancelled)).ok();
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(submission) = state.fire(Instant::now()) {
                    start(submission);
                }
            }
            Some(()) = done_rx.recv() => {
                if let Some(submission) = state.settle(Instant::now()) {
                    start(submission);
                }
            }
        }
    }

    // gateway dropped: parked callers learn the session is gone
    if let Some(pending) = state.take_pending() {
        pending.answer.send(Err(GatewayError::Closed)).ok();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use futures::future::join_all;
    use parking_lot::Mutex;

    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    // ------------------------------------------------------------------
    // Pure transitions
    // ------------------------------------------------------------------

    #[test]
    fn test_submit_from_idle_waits() {
        let now = Instant::now();
        let mut state = FlightState::Idle;
        assert!(state.submit(1, now, WINDOW).is_none());
        assert_eq!(state.deadline(), Some(now + WINDOW));
    }

    #[test]
    fn test_submit_while_waiting_supersedes_and_restarts_window() {
        let now = Instant::now();
        let mut state = FlightState::Idle;
        state.submit(1, now, WINDOW);

        let later = now + Duration::from_millis(100);
        assert_eq!(state.submit(2, later, WINDOW), Some(1));
        assert_eq!(state.deadline(), Some(later + WINDOW));
    }

    #[test]
    fn test_fire_before_due_does_nothing() {
        let now = Instant::now();
        let mut state = FlightState::Idle;
        state.submit(1, now, WINDOW);

        assert!(state.fire(now + Duration::from_millis(10)).is_none());
        assert_eq!(state.fire(now + WINDOW), Some(1));
        assert!(state.is_in_flight());
        assert!(state.deadline().is_none());
    }

    #[test]
    fn test_settle_dispatches_due_waiter() {
        let now = Instant::now();
        let mut state = FlightState::InFlight;
        assert!(state.submit(7, now, WINDOW).is_none());
        assert!(state.deadline().is_none());

        assert_eq!(state.settle(now + WINDOW), Some(7));
        assert!(state.is_in_flight());
        assert!(state.settle(now + WINDOW).is_none());
        assert!(matches!(state, FlightState::Idle));
    }

    #[test]
    fn test_settle_with_early_waiter_returns_to_waiting() {
        let now = Instant::now();
        let mut state = FlightState::InFlight;
        state.submit(7, now, WINDOW);

        assert!(state.settle(now + Duration::from_millis(5)).is_none());
        assert_eq!(state.deadline(), Some(now + WINDOW));
    }

    #[test]
    fn test_submit_while_in_flight_waiting_supersedes() {
        let now = Instant::now();
        let mut state = FlightState::InFlight;
        state.submit(1, now, WINDOW);
        assert_eq!(state.submit(2, now, WINDOW), Some(1));
        assert!(state.is_in_flight());
    }

    // ------------------------------------------------------------------
    // Actor
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<u32>>,
        outstanding: AtomicUsize,
        max_outstanding: AtomicUsize,
    }

    fn flight(recorder: Arc<Recorder>, work: Duration) -> Flight<u32, u32> {
        Flight::spawn("test", WINDOW, move |n: u32| {
            let recorder = recorder.clone();
            async move {
                recorder.calls.lock().push(n);
                let now = recorder.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                recorder.max_outstanding.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(work).await;
                recorder.outstanding.fetch_sub(1, Ordering::SeqCst);
                Ok(n * 10)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last_call() {
        let recorder = Arc::new(Recorder::default());
        let flight = flight(recorder.clone(), Duration::from_millis(50));

        let results = join_all((1..=5).map(|n| flight.call(n))).await;

        for result in &results[..4] {
            assert!(matches!(result, Err(GatewayError::Cancelled)));
        }
        assert_eq!(results[4].as_ref().unwrap(), &50);
        assert_eq!(*recorder.calls.lock(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_queues_latest_waiter() {
        let recorder = Arc::new(Recorder::default());
        let flight = Arc::new(flight(recorder.clone(), Duration::from_secs(2)));

        let first = tokio::spawn({
            let flight = flight.clone();
            async move { flight.call(1).await }
        });
        // let the first call leave its window and start running
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;

        let second = tokio::spawn({
            let flight = flight.clone();
            async move { flight.call(2).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let third = tokio::spawn({
            let flight = flight.clone();
            async move { flight.call(3).await }
        });

        assert_eq!(first.await.unwrap().unwrap(), 10);
        assert!(matches!(second.await.unwrap(), Err(GatewayError::Cancelled)));
        assert_eq!(third.await.unwrap().unwrap(), 30);

        assert_eq!(*recorder.calls.lock(), vec![1, 3]);
        assert_eq!(recorder.max_outstanding.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_respects_its_own_window() {
        let recorder = Arc::new(Recorder::default());
        let flight = Arc::new(flight(recorder.clone(), Duration::from_millis(100)));

        let first = tokio::spawn({
            let flight = flight.clone();
            async move { flight.call(1).await }
        });
        tokio::time::sleep(WINDOW + Duration::from_millis(50)).await;

        // in flight until WINDOW + 100ms; this call is due at WINDOW + 350ms
        let submitted = Instant::now();
        let second = flight.call(2).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap(), 10);
        assert_eq!(second, 20);
        assert!(Instant::now() >= submitted + WINDOW);
        assert_eq!(recorder.max_outstanding.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_flight_closes_parked_call() {
        let recorder = Arc::new(Recorder::default());
        let flight = flight(recorder.clone(), Duration::from_millis(10));

        let (answer, rx) = oneshot::channel();
        flight
            .tx
            .send(Submission { args: 1, answer })
            .unwrap_or_else(|_| panic!("actor gone"));
        drop(flight);

        assert!(matches!(rx.await.unwrap(), Err(GatewayError::Closed)));
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn test_scheduler_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let (_tx, rx) = mpsc::unbounded_channel::<Submission<u32, u32>>();
        let shared = Arc::new(Recorder::default());
        let scheduler = run("send", WINDOW, rx, move |n: u32| {
            let shared = shared.clone();
            async move {
                shared.calls.lock().push(n);
                Ok(n)
            }
        });
        assert_send(&scheduler);
    }
}
