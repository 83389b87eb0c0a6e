//! Debounce of read authorization decisions.
//!
//! Listing and stat calls come in bursts when a caller walks a tree. The
//! worker remembers one reference request in a [`DecisionSlot`]; a read
//! issued while a similar request is pending or recently resolved reuses that
//! outcome instead of asking the user again. Writes are never debounced.
//!
//! Similarity deliberately ignores which resource is being read.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default time a resolved decision is honored.
pub const DEFAULT_HONOR_WINDOW: Duration = Duration::from_secs(5);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Final outcome of a read authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The helper accepted the request
    Allowed,
    /// The helper refused the request, or could not be asked
    Denied,
}

/// One read request as seen by the debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAuthorization {
    id: u64,
    window: Duration,
    created: Instant,
    completed: Option<Instant>,
    outcome: Option<Outcome>,
}

impl ReadAuthorization {
    /// A new unresolved request created now.
    pub fn new(window: Duration) -> Self {
        Self::created_at(Instant::now(), window)
    }

    pub(crate) fn created_at(created: Instant, window: Duration) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            window,
            created,
            completed: None,
            outcome: None,
        }
    }

    /// Record the only and final outcome. Later calls are ignored.
    pub fn set_outcome(&mut self, outcome: Outcome) {
        self.set_outcome_at(outcome, Instant::now());
    }

    pub(crate) fn set_outcome_at(&mut self, outcome: Outcome, completed: Instant) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
            self.completed = Some(completed);
        }
    }

    /// Outcome, once resolved.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Creation time.
    pub fn created(&self) -> Instant {
        self.created
    }

    /// Resolution time.
    pub fn completed(&self) -> Option<Instant> {
        self.completed
    }

    /// Whether two requests can share one decision.
    ///
    /// Resolved pairs compare outcomes. Otherwise a request created within
    /// the window after the other completed, or created within the window of
    /// the other's creation, is similar. The relation is symmetric.
    pub fn is_similar_to(&self, other: &ReadAuthorization) -> bool {
        let window = self.window.max(other.window);
        if let (Some(a), Some(b)) = (self.outcome, other.outcome) {
            return a == b;
        }
        if let Some(completed) = self.completed {
            if other.created < completed + window {
                return true;
            }
        }
        if let Some(completed) = other.completed {
            if self.created < completed + window {
                return true;
            }
        }
        abs_diff(self.created, other.created) < window
    }

    /// Unresolved requests are always relevant; resolved ones for one window.
    pub fn is_still_relevant(&self) -> bool {
        match self.completed {
            None => true,
            Some(completed) => Instant::now().saturating_duration_since(completed) < self.window,
        }
    }
}

fn abs_diff(a: Instant, b: Instant) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

/// The single shared cell holding the reference request.
///
/// Operations hold the internal lock for one copy or one compare, never
/// across an await.
#[derive(Debug, Default)]
pub struct DecisionSlot {
    cell: Mutex<Option<ReadAuthorization>>,
}

impl DecisionSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current occupant.
    pub fn load(&self) -> Option<ReadAuthorization> {
        *self.cell.lock()
    }

    /// Replace the occupant with `new` if it still equals `current`.
    ///
    /// On failure returns the actual occupant.
    pub fn compare_exchange(
        &self,
        current: Option<ReadAuthorization>,
        new: Option<ReadAuthorization>,
    ) -> Result<(), Option<ReadAuthorization>> {
        let mut cell = self.cell.lock();
        if *cell == current {
            *cell = new;
            Ok(())
        } else {
            Err(*cell)
        }
    }
}

/// Handle on the remembered read decision, shared by every worker proxy of a
/// process.
#[derive(Debug, Clone)]
pub struct AuthorizationDebounce {
    slot: Arc<DecisionSlot>,
    window: Duration,
}

impl Default for AuthorizationDebounce {
    fn default() -> Self {
        Self::new(DEFAULT_HONOR_WINDOW)
    }
}

impl AuthorizationDebounce {
    /// Debounce honoring decisions for `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            slot: Arc::new(DecisionSlot::new()),
            window,
        }
    }

    /// Honor window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start a new read request with this debounce's window.
    pub fn begin(&self) -> ReadAuthorization {
        ReadAuthorization::new(self.window)
    }

    /// The shared slot.
    pub fn slot(&self) -> &DecisionSlot {
        &self.slot
    }

    /// Try to make `request` the reference request.
    ///
    /// Returns whether it was installed. Gives up on any concurrent change
    /// instead of retrying, except while evicting an expired occupant.
    pub fn consider_remembering(&self, request: &ReadAuthorization) -> bool {
        let mut previous = self.slot.load();
        while let Some(stale) = previous.filter(|p| !p.is_still_relevant()) {
            match self.slot.compare_exchange(Some(stale), None) {
                Ok(()) => {
                    previous = None;
                    break;
                }
                Err(actual) => previous = actual,
            }
        }

        if !request.is_still_relevant() {
            return false;
        }

        if self.slot.compare_exchange(None, Some(*request)).is_ok() {
            return true;
        }

        let occupant_unresolved = previous.map_or(true, |p| p.outcome.is_none());
        if occupant_unresolved && request.outcome.is_some() {
            return self.slot.compare_exchange(previous, Some(*request)).is_ok();
        }

        if previous.map_or(true, |p| !p.is_similar_to(request)) {
            return self.slot.compare_exchange(previous, Some(*request)).is_ok();
        }

        false
    }

    /// Outcome of a similar earlier request, waiting while it is unresolved.
    ///
    /// `None` means the caller must obtain a fresh decision, either because
    /// `request` is now the reference request or because nothing similar is
    /// remembered.
    pub async fn result_of_previous_request_similar_to(
        &self,
        request: &ReadAuthorization,
    ) -> Option<Outcome> {
        if self.consider_remembering(request) {
            return None;
        }

        let mut previous = self.slot.load();
        while previous.is_some_and(|p| p.is_similar_to(request) && p.outcome.is_none()) {
            debug!("waiting for a similar read authorization to resolve");
            tokio::time::sleep(self.window / 2).await;
            previous = self.slot.load();
        }

        previous
            .filter(|p| p.is_similar_to(request))
            .and_then(|p| p.outcome)
    }
}
