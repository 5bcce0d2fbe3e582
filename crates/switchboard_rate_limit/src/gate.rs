//! Per-backend admission gate.
//!
//! A `ThrottleGate` enforces two limits at once:
//! - **Concurrency**: at most `max_concurrent` admissions outstanding
//! - **Sliding window**: at most `requests_per_window` admissions inside any
//!   window of length `window` (0 disables this check)
//!
//! Waiters are served strictly first-in, first-out. The queue is re-evaluated
//! whenever an admission is released, when limits are updated, and at a
//! scheduled wake-up when the oldest logged admission leaves the window.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Grants are handed to waiters through `oneshot` channels after
//! the lock is dropped.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use switchboard_core::{BackendDescriptor, UnitOfWork};
use switchboard_error::{BackendFailure, ThrottleError, ThrottleErrorKind};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

/// Effective limits of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct GateLimits {
    /// Maximum admissions outstanding at once.
    max_concurrent: usize,
    /// Admissions allowed per window; 0 means unlimited.
    requests_per_window: u32,
    /// Sliding window length.
    window: Duration,
    /// Per-call budget covering queue wait plus execution.
    timeout: Duration,
}

impl From<&BackendDescriptor> for GateLimits {
    fn from(descriptor: &BackendDescriptor) -> Self {
        Self {
            max_concurrent: *descriptor.max_concurrent(),
            requests_per_window: *descriptor.requests_per_window(),
            window: *descriptor.window(),
            timeout: *descriptor.timeout(),
        }
    }
}

/// Live change to a gate's limits.
///
/// Unset fields keep their current value. Changes apply to admissions made
/// after the update; calls already running keep their deadline.
///
/// # Examples
///
/// ```
/// use switchboard_rate_limit::GateUpdate;
///
/// let update = GateUpdate::default().with_requests_per_window(30);
/// assert_eq!(update.requests_per_window, Some(30));
/// assert!(update.max_concurrent.is_none());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateUpdate {
    /// New concurrency limit.
    pub max_concurrent: Option<usize>,
    /// New per-window admission limit.
    pub requests_per_window: Option<u32>,
    /// New per-call timeout.
    pub timeout: Option<Duration>,
}

impl GateUpdate {
    /// Set the concurrency limit.
    pub fn with_max_concurrent(mut self, value: usize) -> Self {
        self.max_concurrent = Some(value);
        self
    }

    /// Set the per-window admission limit.
    pub fn with_requests_per_window(mut self, value: u32) -> Self {
        self.requests_per_window = Some(value);
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    /// Check if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.max_concurrent.is_none() && self.requests_per_window.is_none() && self.timeout.is_none()
    }

    #[track_caller]
    fn validate(&self) -> Result<(), ThrottleError> {
        if self.max_concurrent == Some(0) {
            return Err(ThrottleError::new(ThrottleErrorKind::InvalidLimits(
                "max_concurrent must be at least 1".to_string(),
            )));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(ThrottleError::new(ThrottleErrorKind::InvalidLimits(
                "timeout must be greater than zero".to_string(),
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct GateSnapshot {
    /// Backend the gate belongs to.
    backend_id: String,
    /// Admissions currently outstanding.
    active: usize,
    /// Callers waiting for admission.
    queued: usize,
    /// Admissions logged inside the current window.
    in_window: usize,
    /// Limits in force.
    limits: GateLimits,
}

struct Waiter {
    ticket: u64,
    grant: oneshot::Sender<Admission>,
}

struct GateState {
    limits: GateLimits,
    active: usize,
    admitted: VecDeque<Instant>,
    waiters: VecDeque<Waiter>,
    next_ticket: u64,
    wake: Option<(Instant, AbortHandle)>,
}

impl GateState {
    fn prune(&mut self, now: Instant) {
        let window = self.limits.window;
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn window_full(&self) -> bool {
        self.limits.requests_per_window != 0
            && self.admitted.len() >= self.limits.requests_per_window as usize
    }

    fn can_admit(&self) -> bool {
        self.active < self.limits.max_concurrent && !self.window_full()
    }

    fn record(&mut self, now: Instant) {
        self.admitted.push_back(now);
        self.active += 1;
    }

    /// Earliest instant at which a window-blocked queue may move.
    fn window_reopens_at(&self) -> Option<Instant> {
        if self.waiters.is_empty() || !self.window_full() {
            return None;
        }
        self.admitted
            .front()
            .map(|&oldest| oldest + self.limits.window)
    }
}

struct GateShared {
    id: String,
    state: Mutex<GateState>,
}

impl GateShared {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit queued waiters that fit, then arrange a wake-up if the window
    /// is what blocks the queue head.
    fn settle(self: &Arc<Self>) {
        let handle = Handle::try_current().ok();
        let grants = {
            let mut state = self.lock();
            let now = Instant::now();
            state.prune(now);

            // A wake task that already ran, or died with its runtime, no
            // longer covers the queue.
            if state
                .wake
                .as_ref()
                .is_some_and(|(at, task)| *at <= now || task.is_finished())
            {
                state.wake = None;
            }

            let mut grants = Vec::new();
            while let Some(front) = state.waiters.front() {
                if front.grant.is_closed() {
                    state.waiters.pop_front();
                    continue;
                }
                if !state.can_admit() {
                    break;
                }
                let Some(waiter) = state.waiters.pop_front() else {
                    break;
                };
                state.record(now);
                trace!(backend = %self.id, ticket = waiter.ticket, "Granting queued admission");
                grants.push((waiter.grant, Admission::new(Arc::clone(self), now)));
            }

            if let (Some(at), Some(handle)) = (state.window_reopens_at(), &handle)
                && state.wake.as_ref().is_none_or(|(current, _)| at < *current)
            {
                if let Some((_, stale)) = state.wake.take() {
                    stale.abort();
                }
                let task = handle.spawn(Self::wake_at(Arc::downgrade(self), at));
                state.wake = Some((at, task.abort_handle()));
            }
            grants
        };

        for (grant, admission) in grants {
            // A receiver that went away in the meantime hands the admission
            // back; dropping it releases the slot.
            if let Err(admission) = grant.send(admission) {
                drop(admission);
            }
        }
    }

    async fn wake_at(weak: Weak<Self>, at: Instant) {
        sleep_until(at).await;
        if let Some(shared) = weak.upgrade() {
            {
                let mut state = shared.lock();
                if state.wake.as_ref().is_some_and(|(current, _)| *current == at) {
                    state.wake = None;
                }
            }
            shared.settle();
        }
    }

    fn release(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            trace!(backend = %self.id, active = state.active, "Released admission");
        }
        self.settle();
    }
}

/// Permission to run one call against a backend.
///
/// The slot is released exactly once: by [`release`](Self::release) or when
/// the admission is dropped.
#[must_use = "dropping an admission releases its slot immediately"]
pub struct Admission {
    shared: Option<Arc<GateShared>>,
    admitted_at: Instant,
}

impl Admission {
    fn new(shared: Arc<GateShared>, admitted_at: Instant) -> Self {
        Self {
            shared: Some(shared),
            admitted_at,
        }
    }

    /// When the admission was granted.
    pub fn admitted_at(&self) -> Instant {
        self.admitted_at
    }

    /// Release the slot now.
    pub fn release(mut self) {
        self.release_slot();
    }

    fn release_slot(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release();
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.release_slot();
    }
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission")
            .field(
                "backend",
                &self.shared.as_ref().map(|shared| shared.id.as_str()),
            )
            .field("admitted_at", &self.admitted_at)
            .finish()
    }
}

/// Removes a queued waiter when its admission future ends without a grant.
struct QueueSlot<'a> {
    shared: &'a Arc<GateShared>,
    ticket: u64,
    armed: bool,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let removed = {
            let mut state = self.shared.lock();
            let before = state.waiters.len();
            let ticket = self.ticket;
            state.waiters.retain(|waiter| waiter.ticket != ticket);
            before != state.waiters.len()
        };
        if removed {
            debug!(backend = %self.shared.id, ticket = self.ticket, "Abandoned queued admission");
            self.shared.settle();
        }
    }
}

/// Bounded-concurrency, sliding-window admission gate for one backend.
///
/// Cloning is cheap and yields a handle to the same gate.
///
/// # Examples
///
/// ```
/// use switchboard_core::BackendDescriptor;
/// use switchboard_rate_limit::ThrottleGate;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let descriptor = BackendDescriptor::builder()
///     .id("gemini")
///     .max_concurrent(2usize)
///     .build()
///     .unwrap();
/// let gate = ThrottleGate::new(&descriptor);
///
/// let admission = gate.admit().await.unwrap();
/// assert_eq!(*gate.snapshot().active(), 1);
/// admission.release();
/// assert_eq!(*gate.snapshot().active(), 0);
/// # });
/// ```
#[derive(Clone)]
pub struct ThrottleGate {
    shared: Arc<GateShared>,
}

impl ThrottleGate {
    /// Create a gate from a backend descriptor.
    pub fn new(descriptor: &BackendDescriptor) -> Self {
        Self::with_limits(descriptor.id().clone(), GateLimits::from(descriptor))
    }

    /// Create a gate from explicit limits.
    pub fn with_limits(id: impl Into<String>, limits: GateLimits) -> Self {
        Self {
            shared: Arc::new(GateShared {
                id: id.into(),
                state: Mutex::new(GateState {
                    limits,
                    active: 0,
                    admitted: VecDeque::new(),
                    waiters: VecDeque::new(),
                    next_ticket: 0,
                    wake: None,
                }),
            }),
        }
    }

    /// Backend this gate guards.
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Limits currently in force.
    pub fn limits(&self) -> GateLimits {
        self.shared.lock().limits
    }

    /// Current counters.
    pub fn snapshot(&self) -> GateSnapshot {
        let mut state = self.shared.lock();
        state.prune(Instant::now());
        GateSnapshot {
            backend_id: self.shared.id.clone(),
            active: state.active,
            queued: state
                .waiters
                .iter()
                .filter(|waiter| !waiter.grant.is_closed())
                .count(),
            in_window: state.admitted.len(),
            limits: state.limits,
        }
    }

    /// Wait for admission, giving up after the gate's timeout.
    ///
    /// # Errors
    ///
    /// Returns `QueueTimeout` if no slot opened before the deadline.
    pub async fn admit(&self) -> Result<Admission, ThrottleError> {
        let deadline = Instant::now() + self.limits().timeout;
        self.admit_until(deadline).await
    }

    /// Wait for admission until `deadline`.
    ///
    /// Dropping the returned future before it resolves removes the caller from
    /// the queue without consuming a slot.
    ///
    /// # Errors
    ///
    /// Returns `QueueTimeout` if no slot opened before the deadline.
    #[instrument(skip(self), fields(backend = %self.shared.id))]
    pub async fn admit_until(&self, deadline: Instant) -> Result<Admission, ThrottleError> {
        let requested = Instant::now();
        let (ticket, mut rx) = {
            let mut state = self.shared.lock();
            state.prune(requested);
            state.waiters.retain(|waiter| !waiter.grant.is_closed());

            if state.waiters.is_empty() && state.can_admit() {
                state.record(requested);
                debug!(active = state.active, in_window = state.admitted.len(), "Admitted immediately");
                return Ok(Admission::new(Arc::clone(&self.shared), requested));
            }

            let (tx, rx) = oneshot::channel();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.waiters.push_back(Waiter { ticket, grant: tx });
            debug!(
                ticket,
                position = state.waiters.len(),
                active = state.active,
                "Queued for admission"
            );
            (ticket, rx)
        };

        let mut slot = QueueSlot {
            shared: &self.shared,
            ticket,
            armed: true,
        };
        self.shared.settle();

        match timeout_at(deadline, &mut rx).await {
            Ok(Ok(admission)) => {
                slot.armed = false;
                debug!(ticket, waited = ?requested.elapsed(), "Admitted from queue");
                Ok(admission)
            }
            Ok(Err(_)) => Err(ThrottleError::new(ThrottleErrorKind::Closed(
                self.shared.id.clone(),
            ))),
            Err(_) => {
                // A grant may have raced the deadline. Closing the channel makes
                // any later send fail, and a grant already delivered is dropped
                // here, so the slot is released either way.
                rx.close();
                if let Ok(admission) = rx.try_recv() {
                    drop(admission);
                }
                let waited = requested.elapsed();
                debug!(ticket, ?waited, "Admission timed out in queue");
                Err(ThrottleError::new(ThrottleErrorKind::QueueTimeout {
                    backend: self.shared.id.clone(),
                    waited,
                }))
            }
        }
    }

    /// Admit and run one unit of work under the gate's timeout.
    ///
    /// The timeout is counted from this call, so time spent queued shrinks the
    /// time left for execution. When it expires mid-call the unit's
    /// cancellation token is raised and the slot is released.
    ///
    /// # Errors
    ///
    /// Returns the unit's own failure, or a `timeout`-tagged failure when the
    /// deadline passes in the queue or during execution.
    #[instrument(skip(self, work), fields(backend = %self.shared.id))]
    pub async fn run(&self, work: UnitOfWork) -> Result<String, BackendFailure> {
        let requested = Instant::now();
        let timeout = self.limits().timeout;
        let deadline = requested + timeout;

        let admission = self.admit_until(deadline).await?;
        let queued = admission.admitted_at().saturating_duration_since(requested);

        let token = CancellationToken::new();
        let _cancel_on_drop = token.clone().drop_guard();
        let result = timeout_at(deadline, work.call(token.clone())).await;
        admission.release();

        match result {
            Ok(result) => result,
            Err(_) => {
                token.cancel();
                debug!(?timeout, ?queued, "Call exceeded deadline; cancelled");
                Err(ThrottleError::new(ThrottleErrorKind::ExecutionTimeout {
                    backend: self.shared.id.clone(),
                    timeout,
                    queued,
                })
                .into())
            }
        }
    }

    /// Change limits for future admissions and re-evaluate the queue.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLimits` for a zero concurrency limit or timeout.
    #[instrument(skip(self), fields(backend = %self.shared.id))]
    pub fn update(&self, update: GateUpdate) -> Result<(), ThrottleError> {
        update.validate()?;
        {
            let mut state = self.shared.lock();
            let limits = &mut state.limits;
            if let Some(max_concurrent) = update.max_concurrent {
                limits.max_concurrent = max_concurrent;
            }
            if let Some(requests_per_window) = update.requests_per_window {
                limits.requests_per_window = requests_per_window;
            }
            if let Some(timeout) = update.timeout {
                limits.timeout = timeout;
            }
            info!(limits = ?state.limits, "Updated gate limits");
        }
        self.shared.settle();
        Ok(())
    }
}

impl fmt::Debug for ThrottleGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleGate")
            .field("id", &self.shared.id)
            .field("limits", &self.limits())
            .finish()
    }
}
