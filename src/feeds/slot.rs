use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::JoinHandle;
use tracing::debug;

use super::{FeedEnvelope, FeedError, FeedKind, FeedLoad};

#[derive(Clone, Debug, PartialEq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Loaded(FeedLoad<T>),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Holds one view's feed data. Fetches spawned through [`FeedSlot::spawn_load`]
/// keep only a weak handle, so once the slot is disposed a late response is
/// dropped instead of written.
#[derive(Debug)]
pub struct FeedSlot<T> {
    feed: FeedKind,
    state: Arc<Mutex<LoadState<T>>>,
}

fn lock<T>(state: &Mutex<LoadState<T>>) -> MutexGuard<'_, LoadState<T>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T> FeedSlot<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(feed: FeedKind) -> Self {
        Self {
            feed,
            state: Arc::new(Mutex::new(LoadState::Idle)),
        }
    }

    pub fn feed(&self) -> FeedKind {
        self.feed
    }

    pub fn snapshot(&self) -> LoadState<T> {
        lock(&self.state).clone()
    }

    /// Runs `fetch` on the runtime. The handle resolves to `true` when the
    /// result was stored and `false` when the slot was gone by then.
    pub fn spawn_load<F>(&self, fetch: F) -> JoinHandle<bool>
    where
        F: Future<Output = Result<FeedEnvelope<T>, FeedError>> + Send + 'static,
    {
        *lock(&self.state) = LoadState::Loading;
        let weak: Weak<Mutex<LoadState<T>>> = Arc::downgrade(&self.state);
        let feed = self.feed;
        tokio::spawn(async move {
            let result = fetch.await;
            let Some(state) = weak.upgrade() else {
                debug!(feed = %feed, "slot disposed before the response arrived, dropping it");
                return false;
            };
            *lock(&state) = LoadState::Loaded(FeedLoad::from_result(feed, result));
            true
        })
    }

    pub fn dispose(self) {
        debug!(feed = %self.feed, "disposing feed slot");
    }
}
