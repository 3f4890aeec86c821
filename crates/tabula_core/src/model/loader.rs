//! Retain-counted asynchronous loading.
//!
//! Some model data is not resident by default. A [`LoadController`] tracks
//! how many consumers need it, fetches it from the host once for any number
//! of concurrent requesters, and evicts it a grace period after the last
//! consumer lets go.
//!
//! ```text
//! Unloaded --acquire--> Loading --fetch ok--> Loaded --release to 0--> (timer) --> Unloaded
//!                          |                    ^  |                      |
//!                          +--fetch err--> Unloaded  +------acquire--------+ (timer cancelled)
//! ```

use super::node::ModelNode;
use super::ModelRef;
use crate::document::Change;
use crate::error::{CoreError, CoreResult};
use crate::host::{FetchResult, ResourceDescriptor};
use crate::watch::{NotifyArgs, WatchKey};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

type Waiter = oneshot::Sender<CoreResult<()>>;

/// A model whose data is loaded on demand.
pub(crate) trait Loadable: Clone + Send + Sync + 'static {
    fn node(&self) -> &ModelNode;

    fn loader(&self) -> &LoadController;

    fn descriptor(&self) -> ResourceDescriptor;

    /// Writes that place fetched data into the document.
    fn load_changes(&self, data: Value) -> Vec<Change>;

    /// Writes that remove the loaded data from the document.
    fn evict_changes(&self) -> Vec<Change>;

    /// Drops memoized children whose data was evicted.
    fn clear_children(&self) {}

    fn loaded_key(&self) -> WatchKey;

    fn to_model_ref(&self) -> ModelRef;
}

enum Phase {
    Unloaded,
    Loading { waiters: Vec<Waiter> },
    Loaded,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Unloaded => "unloaded",
            Phase::Loading { .. } => "loading",
            Phase::Loaded => "loaded",
        }
    }
}

struct LoadState {
    phase: Phase,
    retain_count: usize,
    unload_timer: Option<JoinHandle<()>>,
    /// Bumped on every cancellation so a timer that already woke up can
    /// tell it was superseded.
    unload_epoch: u64,
}

impl LoadState {
    fn cancel_unload(&mut self) {
        self.unload_epoch = self.unload_epoch.wrapping_add(1);
        if let Some(timer) = self.unload_timer.take() {
            timer.abort();
        }
    }
}

/// Per-resource load state machine with retain counting.
pub(crate) struct LoadController {
    state: Mutex<LoadState>,
}

impl LoadController {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LoadState {
                phase: Phase::Unloaded,
                retain_count: 0,
                unload_timer: None,
                unload_epoch: 0,
            }),
        }
    }

    pub(crate) fn is_loaded(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Loaded)
    }

    pub(crate) fn retain_count(&self) -> usize {
        self.state.lock().retain_count
    }

    pub(crate) fn is_unload_pending(&self) -> bool {
        self.state.lock().unload_timer.is_some()
    }

    /// Retains the resource and waits until it is loaded.
    ///
    /// Concurrent callers share one fetch. On failure every waiter receives
    /// the same error and none of them stays retained.
    pub(crate) async fn acquire<T: Loadable>(owner: &T) -> CoreResult<()> {
        let (receiver, start) = {
            let mut guard = owner.loader().state.lock();
            let state = &mut *guard;
            state.cancel_unload();
            state.retain_count += 1;

            match &mut state.phase {
                Phase::Loaded => return Ok(()),
                Phase::Loading { waiters } => {
                    let (sender, receiver) = oneshot::channel();
                    waiters.push(sender);
                    debug!(entity = %owner.node().describe(), waiters = waiters.len(), "joined in-flight load");
                    (receiver, None)
                }
                Phase::Unloaded => {
                    let Ok(runtime) = Handle::try_current() else {
                        state.retain_count -= 1;
                        return Err(CoreError::fetch(format!(
                            "loading {} requires a tokio runtime",
                            owner.node().describe()
                        )));
                    };
                    let (sender, receiver) = oneshot::channel();
                    state.phase = Phase::Loading {
                        waiters: vec![sender],
                    };
                    (receiver, Some(runtime))
                }
            }
        };

        // Runs without the state lock; the host may call back into the models.
        if let Some(runtime) = start {
            let descriptor = owner.descriptor();
            debug!(entity = %owner.node().describe(), resource = ?descriptor, "starting fetch");
            let fetch = owner.node().ctx().host().fetch(&descriptor);
            let task_owner = owner.clone();
            runtime.spawn(async move {
                let result = fetch.await;
                finish_load(&task_owner, result);
            });
        }

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(CoreError::invariant(format!(
                "load of {} ended without resolving its waiters",
                owner.node().describe()
            ))),
        }
    }

    /// Releases one retain. The last release schedules eviction.
    ///
    /// Releasing more often than acquiring is clamped at zero and warns on
    /// every occurrence.
    pub(crate) fn release<T: Loadable>(owner: &T) {
        let expire_now = {
            let mut guard = owner.loader().state.lock();
            let state = &mut *guard;
            if state.retain_count == 0 {
                None
            } else {
                state.retain_count -= 1;
                if state.retain_count > 0 || !matches!(state.phase, Phase::Loaded) {
                    // A load still in flight schedules eviction when it completes.
                    return;
                }
                Some(schedule_unload(state, owner))
            }
        };
        match expire_now {
            None => owner.node().ctx().warnings().warn(format!(
                "{} was over-released: unload_data() called more often than load_data()",
                owner.node().describe()
            )),
            Some(Some(epoch)) => expire(owner, epoch),
            Some(None) => {}
        }
    }
}

impl Default for LoadController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoadController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoadController")
            .field("phase", &state.phase.name())
            .field("retain_count", &state.retain_count)
            .field("unload_pending", &state.unload_timer.is_some())
            .finish()
    }
}

/// Starts the grace timer. Returns an epoch to expire immediately when no
/// runtime is available to host the timer.
fn schedule_unload<T: Loadable>(state: &mut LoadState, owner: &T) -> Option<u64> {
    state.cancel_unload();
    let epoch = state.unload_epoch;
    let grace = owner.node().ctx().config().unload_grace_period;
    match Handle::try_current() {
        Ok(runtime) => {
            debug!(entity = %owner.node().describe(), grace_ms = grace.as_millis() as u64, "scheduling unload");
            let task_owner = owner.clone();
            state.unload_timer = Some(runtime.spawn(async move {
                tokio::time::sleep(grace).await;
                expire(&task_owner, epoch);
            }));
            None
        }
        Err(_) => Some(epoch),
    }
}

fn finish_load<T: Loadable>(owner: &T, result: CoreResult<FetchResult>) {
    let ctx = owner.node().ctx().clone();
    let _batch = ctx.batch();

    let fetched = match result {
        Ok(fetched) => fetched,
        Err(err) => {
            let waiters = {
                let mut guard = owner.loader().state.lock();
                let state = &mut *guard;
                let waiters = match std::mem::replace(&mut state.phase, Phase::Unloaded) {
                    Phase::Loading { waiters } => waiters,
                    _ => Vec::new(),
                };
                state.retain_count = state.retain_count.saturating_sub(waiters.len());
                waiters
            };
            warn!(entity = %owner.node().describe(), error = %err, waiters = waiters.len(), "fetch failed");
            for waiter in waiters {
                let _ = waiter.send(Err(err.clone()));
            }
            return;
        }
    };

    let FetchResult {
        data,
        changed_keys_hint,
    } = fetched;
    ctx.apply_silently(&owner.load_changes(data));

    let (waiters, expire_now) = {
        let mut guard = owner.loader().state.lock();
        let state = &mut *guard;
        let waiters = match std::mem::replace(&mut state.phase, Phase::Loaded) {
            Phase::Loading { waiters } => waiters,
            _ => Vec::new(),
        };
        let expire_now = if state.retain_count == 0 {
            schedule_unload(state, owner)
        } else {
            None
        };
        (waiters, expire_now)
    };
    debug!(entity = %owner.node().describe(), waiters = waiters.len(), "load complete");

    let model = owner.to_model_ref();
    let node = owner.node();
    for hint in &changed_keys_hint {
        match node.kind().parse_key(hint) {
            Some(key) => node.notify(&model, key, NotifyArgs::None),
            None => {
                ctx.warnings().warn_once(format!(
                    "ignoring invalid changed key hint for {}: {}",
                    node.kind(),
                    hint
                ));
            }
        }
    }
    node.notify(&model, owner.loaded_key(), NotifyArgs::None);

    for waiter in waiters {
        let _ = waiter.send(Ok(()));
    }
    if let Some(epoch) = expire_now {
        expire(owner, epoch);
    }
}

fn expire<T: Loadable>(owner: &T, epoch: u64) {
    let ctx = owner.node().ctx().clone();
    let _batch = ctx.batch();
    {
        let mut guard = owner.loader().state.lock();
        let state = &mut *guard;
        if state.unload_epoch != epoch {
            return;
        }
        state.unload_timer = None;
        if !matches!(state.phase, Phase::Loaded) {
            return;
        }
        if state.retain_count != 0 {
            let violation = CoreError::invariant(format!(
                "unload timer for {} fired with retain count {}",
                owner.node().describe(),
                state.retain_count
            ));
            error!("{}", violation);
            panic!("{}", violation);
        }
        state.phase = Phase::Unloaded;
    }

    debug!(entity = %owner.node().describe(), "unloading");
    ctx.host().unsubscribe(&owner.descriptor());
    ctx.apply_silently(&owner.evict_changes());
    owner.clear_children();
    owner
        .node()
        .notify(&owner.to_model_ref(), owner.loaded_key(), NotifyArgs::None);
}
