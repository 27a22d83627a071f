use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

pub const LOGO_SETTING_KEY: &str = "team_logo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Players,
    Coaches,
    Teams,
    Settings,
}

pub const WATCHED_COLLECTIONS: [Collection; 4] = [
    Collection::Players,
    Collection::Coaches,
    Collection::Teams,
    Collection::Settings,
];

impl Collection {
    pub fn table(self) -> &'static str {
        match self {
            Collection::Players => "players",
            Collection::Coaches => "coaches",
            Collection::Teams => "teams",
            Collection::Settings => "settings",
        }
    }
}

/// Opaque per-collection change markers. What a marker means is up to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeCursor {
    pub markers: HashMap<Collection, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub collections: Vec<Collection>,
}

/// Row store behind the portal. Entity rows are `{id, data}` with `data` holding the full JSON
/// blob; settings rows are `{key, value}`.
pub trait RemoteStore: Send + Sync {
    /// Confirms the store is reachable and configured. Errors here are fatal for a session.
    fn check(&self) -> Result<()>;

    fn fetch(&self, collection: Collection) -> Result<Vec<Value>>;

    fn upsert(&self, collection: Collection, id: &str, data: &Value) -> Result<()>;

    fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    fn fetch_setting(&self, key: &str) -> Result<Option<String>>;

    fn upsert_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Returns collections whose marker moved since `cursor`, updating it in place. The first
    /// call on an empty cursor only records markers.
    fn poll_changes(&self, cursor: &mut ChangeCursor) -> Result<Vec<Collection>>;
}

/// Handle for a running change watcher. Dropping it stops the thread at its next tick.
pub struct Subscription {
    stop: Arc<AtomicBool>,
}

impl Subscription {
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Polls `store` and invokes `callback` whenever one of `filter` changes.
pub fn subscribe(
    store: Arc<dyn RemoteStore>,
    filter: &[Collection],
    interval: Duration,
    mut callback: impl FnMut(Result<ChangeNotice>) + Send + 'static,
) -> Subscription {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let filter = filter.to_vec();
    thread::spawn(move || {
        let mut cursor = ChangeCursor::default();
        if let Err(err) = store.poll_changes(&mut cursor) {
            callback(Err(err));
        }
        while !flag.load(Ordering::Relaxed) {
            thread::sleep(interval);
            if flag.load(Ordering::Relaxed) {
                break;
            }
            match store.poll_changes(&mut cursor) {
                Ok(changed) => {
                    let collections: Vec<Collection> =
                        changed.into_iter().filter(|c| filter.contains(c)).collect();
                    if !collections.is_empty() {
                        callback(Ok(ChangeNotice { collections }));
                    }
                }
                Err(err) => callback(Err(err)),
            }
        }
    });
    Subscription { stop }
}
