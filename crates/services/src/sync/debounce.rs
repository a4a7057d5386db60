use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use speak_core::model::{AuthContext, StudyData, UserId};

use super::StudySync;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2_000);

struct Pending {
    generation: u64,
    auth: Option<AuthContext>,
    data: StudyData,
    timer: JoinHandle<()>,
}

impl Pending {
    fn user_id(&self) -> Option<UserId> {
        self.auth.as_ref().map(|auth| auth.user_id)
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    pending: Option<Pending>,
}

/// Coalesces bursts of study updates into one push.
///
/// Each `schedule` replaces the pending snapshot and restarts the timer, so
/// only the last snapshot of a burst reaches the backend, `delay` after the
/// last call. A snapshot of a different user is never replaced: it is pushed
/// right away instead.
pub struct DebouncedSync {
    sync: Arc<dyn StudySync>,
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl DebouncedSync {
    #[must_use]
    pub fn new(sync: Arc<dyn StudySync>, delay: Duration) -> Self {
        Self {
            sync,
            delay,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending push with `data` and restart the timer.
    ///
    /// Outside a Tokio runtime the update is dropped with a warning.
    pub fn schedule(&self, auth: Option<AuthContext>, data: StudyData) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("no async runtime; dropping debounced study sync");
            return;
        };

        let user_id = auth.as_ref().map(|auth| auth.user_id);
        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.pending.take() {
            previous.timer.abort();
            if previous.user_id() != user_id {
                debug!("pushing pending study sync of the previous user");
                let sync = Arc::clone(&self.sync);
                runtime.spawn(async move {
                    push(sync.as_ref(), previous.auth.as_ref(), previous.data).await;
                });
            }
        }
        slot.generation += 1;
        let generation = slot.generation;

        let timer = runtime.spawn({
            let slot = Arc::clone(&self.slot);
            let sync = Arc::clone(&self.sync);
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                let fired = lock(&slot)
                    .pending
                    .take_if(|pending| pending.generation == generation);
                if let Some(pending) = fired {
                    push(sync.as_ref(), pending.auth.as_ref(), pending.data).await;
                }
            }
        });
        slot.pending = Some(Pending {
            generation,
            auth,
            data,
            timer,
        });
    }

    /// Drop the pending push, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match lock(&self.slot).pending.take() {
            Some(pending) => {
                pending.timer.abort();
                debug!("pending study sync cancelled");
                true
            }
            None => false,
        }
    }

    /// Drop the pending push if it belongs to `user_id`, whose newer state is
    /// about to be pushed directly. Returns whether one was dropped.
    pub fn supersede(&self, user_id: UserId) -> bool {
        let superseded = lock(&self.slot)
            .pending
            .take_if(|pending| pending.user_id() == Some(user_id));
        match superseded {
            Some(pending) => {
                pending.timer.abort();
                debug!(%user_id, "pending study sync superseded");
                true
            }
            None => false,
        }
    }

    /// Run the pending push now instead of waiting for the timer.
    ///
    /// Returns `None` when nothing was pending, otherwise the push result.
    pub async fn flush(&self) -> Option<bool> {
        let pending = lock(&self.slot).pending.take()?;
        pending.timer.abort();
        Some(push(self.sync.as_ref(), pending.auth.as_ref(), pending.data).await)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn push(sync: &dyn StudySync, auth: Option<&AuthContext>, data: StudyData) -> bool {
    let synced = sync.sync_immediate(auth, data).await;
    if !synced {
        warn!(total_score = data.total_score, "debounced study sync failed");
    }
    synced
}
