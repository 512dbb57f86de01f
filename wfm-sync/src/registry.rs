//! Cache Entry Registry
//!
//! Named, independently stale-able query results with a per-entry refresh
//! policy. The registry is an explicit object (cheap to clone, shared by
//! reference counting) so tests can run several isolated registries side by
//! side.
//!
//! # Rules
//!
//! - Reads never block on the network: they return the best available data
//!   with `is_stale` / `is_loading` / `error` flags and schedule a background
//!   fetch when the entry is stale.
//! - `invalidate` is a monotonic "mark dirty": the next read (or, for entries
//!   with live subscribers, an immediate background task) refetches regardless
//!   of the remaining stale time.
//! - Fetch failures keep the last known data and set the error flag.
//! - Every fetch carries a sequence number; a result that lands after a newer
//!   one has been applied is dropped.
//! - An entry with `depends_on` is not fetched until its prerequisite has data.
//! - Results that land after teardown are written anyway; they target the
//!   same keyed store and are idempotent.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::keys::CacheKey;

/// Outcome of one fetch; errors are carried as display text
pub type FetchResult = std::result::Result<Value, String>;

/// Asynchronous producer of an entry's data
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// Wrap an async closure as a [`Fetcher`]
pub fn fetcher<F, Fut>(f: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Guard against dependency cycles
const MAX_DEPENDENCY_DEPTH: usize = 8;

/// Per-entry refresh policy
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Data is considered fresh for this long after a fetch
    pub stale_time: Duration,
    /// Periodic refetch even without invalidation
    pub refetch_interval: Option<Duration>,
    /// Keep polling while the view is not focused
    pub background_refetch_allowed: bool,
    /// Entry waits for this prerequisite to resolve before fetching
    pub depends_on: Option<CacheKey>,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            refetch_interval: None,
            background_refetch_allowed: false,
            depends_on: None,
        }
    }
}

impl RefreshPolicy {
    pub fn stale_after(stale_time: Duration) -> Self {
        Self {
            stale_time,
            ..Self::default()
        }
    }

    pub fn with_refetch_interval(mut self, every: Duration) -> Self {
        self.refetch_interval = Some(every);
        self
    }

    pub fn with_background_refetch(mut self) -> Self {
        self.background_refetch_allowed = true;
        self
    }

    pub fn depends_on(mut self, key: CacheKey) -> Self {
        self.depends_on = Some(key);
        self
    }
}

/// Point-in-time view of an entry
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub key: CacheKey,
    /// Best available data (possibly stale)
    pub data: Option<Value>,
    pub is_stale: bool,
    pub is_loading: bool,
    /// Last fetch error, if the most recent fetch failed
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntrySnapshot {
    fn unknown(key: CacheKey) -> Self {
        Self {
            key,
            data: None,
            is_stale: true,
            is_loading: false,
            error: Some(format!("cache entry '{}' is not registered", key)),
            updated_at: None,
        }
    }

    /// Decode the data into a typed value
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        let value = self.data.clone()?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Cached data does not match requested type");
                None
            }
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

struct Entry {
    fetcher: Fetcher,
    policy: RefreshPolicy,
    data: Option<Value>,
    fetched_at: Option<Instant>,
    updated_at: Option<DateTime<Utc>>,
    invalidated: bool,
    in_flight: bool,
    waiting_on_dependency: bool,
    error: Option<String>,
    /// Sequence of the most recently started fetch
    fetch_seq: u64,
    /// Sequence of the most recently applied result
    applied_seq: u64,
    version: u64,
    version_tx: watch::Sender<u64>,
}

impl Entry {
    fn new(fetcher: Fetcher, policy: RefreshPolicy) -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            fetcher,
            policy,
            data: None,
            fetched_at: None,
            updated_at: None,
            invalidated: false,
            in_flight: false,
            waiting_on_dependency: false,
            error: None,
            fetch_seq: 0,
            applied_seq: 0,
            version: 0,
            version_tx,
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        if self.invalidated {
            return true;
        }
        match (&self.data, self.fetched_at) {
            (Some(_), Some(at)) => now.duration_since(at) >= self.policy.stale_time,
            _ => true,
        }
    }

    /// Mark a fetch as started; returns its sequence number and the fetcher
    fn begin_fetch(&mut self) -> (u64, Fetcher) {
        self.fetch_seq += 1;
        self.in_flight = true;
        self.waiting_on_dependency = false;
        self.invalidated = false;
        self.bump();
        (self.fetch_seq, self.fetcher.clone())
    }

    /// Has at least one live subscriber
    fn is_active(&self) -> bool {
        self.version_tx.receiver_count() > 0
    }

    /// Notify subscribers that something observable changed
    fn bump(&mut self) {
        self.version += 1;
        self.version_tx.send_replace(self.version);
    }

    fn snapshot(&self, key: CacheKey, is_stale: bool) -> EntrySnapshot {
        EntrySnapshot {
            key,
            data: self.data.clone(),
            is_stale: is_stale || self.in_flight,
            is_loading: self.in_flight || self.waiting_on_dependency,
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }
}

struct Inner {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    focused: AtomicBool,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for handle in self.pollers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Registry of named cache entries
#[derive(Clone)]
pub struct CacheRegistry {
    inner: Arc<Inner>,
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                focused: AtomicBool::new(true),
                pollers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register (or re-register) an entry
    ///
    /// Re-registering replaces fetcher and policy but keeps cached data.
    pub async fn register(
        &self,
        key: CacheKey,
        fetcher: Fetcher,
        policy: RefreshPolicy,
    ) -> EntryHandle {
        let mut entries = self.inner.entries.lock().await;
        match entries.get_mut(&key) {
            Some(existing) => {
                debug!(key = %key, "Re-registering cache entry");
                existing.fetcher = fetcher;
                existing.policy = policy;
            }
            None => {
                entries.insert(key, Entry::new(fetcher, policy));
            }
        }
        EntryHandle {
            key,
            registry: self.clone(),
        }
    }

    pub async fn is_registered(&self, key: CacheKey) -> bool {
        self.inner.entries.lock().await.contains_key(&key)
    }

    /// Non-blocking read; schedules a background fetch if the entry is stale
    pub async fn read(&self, key: CacheKey) -> EntrySnapshot {
        let mut entries = self.inner.entries.lock().await;
        let now = Instant::now();
        let (stale, needs_fetch) = match entries.get(&key) {
            None => return EntrySnapshot::unknown(key),
            Some(entry) => {
                let stale = entry.is_stale(now);
                (stale, stale && !entry.in_flight)
            }
        };
        if needs_fetch {
            self.schedule(&mut entries, key, 0);
        }
        match entries.get(&key) {
            Some(entry) => entry.snapshot(key, stale),
            None => EntrySnapshot::unknown(key),
        }
    }

    /// Read without scheduling anything
    pub async fn peek(&self, key: CacheKey) -> EntrySnapshot {
        let entries = self.inner.entries.lock().await;
        match entries.get(&key) {
            Some(entry) => entry.snapshot(key, entry.is_stale(Instant::now())),
            None => EntrySnapshot::unknown(key),
        }
    }

    /// Mark an entry stale
    ///
    /// Entries with live subscribers are refetched in the background right
    /// away; the others on their next read. Returns `false` for unknown keys.
    pub async fn invalidate(&self, key: CacheKey) -> bool {
        let mut entries = self.inner.entries.lock().await;
        self.invalidate_locked(&mut entries, key)
    }

    /// Mark several entries stale; returns the keys that were registered
    pub async fn invalidate_many(&self, keys: &[CacheKey]) -> Vec<CacheKey> {
        let mut entries = self.inner.entries.lock().await;
        keys.iter()
            .copied()
            .filter(|key| self.invalidate_locked(&mut entries, *key))
            .collect()
    }

    fn invalidate_locked(&self, entries: &mut HashMap<CacheKey, Entry>, key: CacheKey) -> bool {
        let refetch_now = match entries.get_mut(&key) {
            None => return false,
            Some(entry) => {
                entry.invalidated = true;
                entry.bump();
                entry.is_active() && !entry.in_flight
            }
        };
        if refetch_now {
            self.schedule(entries, key, 0);
        }
        true
    }

    /// Keys currently marked dirty
    pub async fn stale_keys(&self) -> HashSet<CacheKey> {
        let entries = self.inner.entries.lock().await;
        entries
            .iter()
            .filter(|(_, entry)| entry.invalidated)
            .map(|(key, _)| *key)
            .collect()
    }

    /// Seed an entry with known-good data
    pub async fn prime(&self, key: CacheKey, value: Value) -> bool {
        let mut entries = self.inner.entries.lock().await;
        match entries.get_mut(&key) {
            None => false,
            Some(entry) => {
                entry.data = Some(value);
                entry.fetched_at = Some(Instant::now());
                entry.updated_at = Some(Utc::now());
                entry.invalidated = false;
                entry.error = None;
                entry.bump();
                true
            }
        }
    }

    /// Subscribe to change notifications of one entry
    ///
    /// The receiver yields a version counter; re-read the entry on change.
    /// Subscribing marks the entry active and fetches it if stale.
    pub async fn subscribe(&self, key: CacheKey) -> Option<watch::Receiver<u64>> {
        let mut entries = self.inner.entries.lock().await;
        let (rx, needs_fetch) = {
            let entry = entries.get(&key)?;
            (
                entry.version_tx.subscribe(),
                entry.is_stale(Instant::now()) && !entry.in_flight,
            )
        };
        if needs_fetch {
            self.schedule(&mut entries, key, 0);
        }
        Some(rx)
    }

    /// Fetch now and wait for the result
    ///
    /// Bypasses `depends_on`; callers use this when they already know the
    /// prerequisite is loaded.
    pub async fn refetch(&self, key: CacheKey) -> EntrySnapshot {
        let (seq, fetcher) = {
            let mut entries = self.inner.entries.lock().await;
            match entries.get_mut(&key) {
                None => return EntrySnapshot::unknown(key),
                Some(entry) => entry.begin_fetch(),
            }
        };

        let result = fetcher().await;

        let mut entries = self.inner.entries.lock().await;
        self.apply_result(&mut entries, key, seq, result);
        match entries.get(&key) {
            Some(entry) => entry.snapshot(key, entry.is_stale(Instant::now())),
            None => EntrySnapshot::unknown(key),
        }
    }

    pub fn is_focused(&self) -> bool {
        self.inner.focused.load(Ordering::SeqCst)
    }

    /// Record view focus; regaining focus refetches stale active entries
    pub async fn set_focused(&self, focused: bool) {
        let was_focused = self.inner.focused.swap(focused, Ordering::SeqCst);
        if !focused || was_focused {
            return;
        }
        let mut entries = self.inner.entries.lock().await;
        let now = Instant::now();
        let stale_active: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, e)| e.is_active() && !e.in_flight && e.is_stale(now))
            .map(|(key, _)| *key)
            .collect();
        for key in stale_active {
            self.schedule(&mut entries, key, 0);
        }
    }

    /// Start interval refetching for entries that have a `refetch_interval`
    ///
    /// Calling it again restarts the pollers (e.g. after new registrations).
    pub async fn start_polling(&self) {
        let intervals: Vec<(CacheKey, Duration, bool)> = {
            let entries = self.inner.entries.lock().await;
            entries
                .iter()
                .filter_map(|(key, entry)| {
                    entry
                        .policy
                        .refetch_interval
                        .filter(|every| !every.is_zero())
                        .map(|every| (*key, every, entry.policy.background_refetch_allowed))
                })
                .collect()
        };

        let mut pollers = self.inner.pollers.lock().await;
        for handle in pollers.drain(..) {
            handle.abort();
        }
        for (key, every, background) in intervals {
            debug!(key = %key, interval_ms = every.as_millis() as u64, "Starting poller");
            let weak = Arc::downgrade(&self.inner);
            pollers.push(tokio::spawn(poll_entry(weak, key, every, background)));
        }
    }

    /// Stop all pollers (in-flight fetches are left to finish)
    pub async fn shutdown(&self) {
        let mut pollers = self.inner.pollers.lock().await;
        for handle in pollers.drain(..) {
            handle.abort();
        }
    }

    pub async fn poller_count(&self) -> usize {
        self.inner.pollers.lock().await.len()
    }

    /// Start a background fetch for `key` (lock held by caller)
    fn schedule(&self, entries: &mut HashMap<CacheKey, Entry>, key: CacheKey, depth: usize) {
        if depth > MAX_DEPENDENCY_DEPTH {
            warn!(key = %key, "Dependency chain too deep, not fetching");
            return;
        }

        let depends_on = match entries.get(&key) {
            None => return,
            Some(entry) if entry.in_flight => return,
            Some(entry) => entry.policy.depends_on,
        };

        if let Some(dependency) = depends_on {
            let ready = entries.get(&dependency).map_or(true, |d| d.data.is_some());
            if !ready {
                if let Some(entry) = entries.get_mut(&key) {
                    if !entry.waiting_on_dependency {
                        entry.waiting_on_dependency = true;
                        entry.bump();
                    }
                }
                debug!(key = %key, dependency = %dependency, "Deferring fetch until dependency resolves");
                self.schedule(entries, dependency, depth + 1);
                return;
            }
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(key = %key, "No runtime available, fetch deferred to next read");
            return;
        };

        let Some(entry) = entries.get_mut(&key) else {
            return;
        };
        let (seq, fetcher) = entry.begin_fetch();
        runtime.spawn(self.clone().complete_fetch(key, seq, fetcher));
    }

    fn complete_fetch(self, key: CacheKey, seq: u64, fetcher: Fetcher) -> BoxFuture<'static, ()> {
        async move {
            debug!(key = %key, seq, "Fetching cache entry");
            let result = fetcher().await;
            let mut entries = self.inner.entries.lock().await;
            self.apply_result(&mut entries, key, seq, result);
        }
        .boxed()
    }

    fn apply_result(
        &self,
        entries: &mut HashMap<CacheKey, Entry>,
        key: CacheKey,
        seq: u64,
        result: FetchResult,
    ) {
        let (succeeded, refetch_again) = {
            let Some(entry) = entries.get_mut(&key) else {
                return;
            };
            if seq <= entry.applied_seq {
                debug!(key = %key, seq, applied = entry.applied_seq, "Dropping overtaken fetch result");
                return;
            }
            entry.applied_seq = seq;
            let latest = seq == entry.fetch_seq;
            if latest {
                entry.in_flight = false;
            }
            let invalidated_during_flight = entry.invalidated;

            let succeeded = match result {
                Ok(value) => {
                    entry.data = Some(value);
                    entry.fetched_at = Some(Instant::now());
                    entry.updated_at = Some(Utc::now());
                    entry.error = None;
                    true
                }
                Err(message) => {
                    warn!(key = %key, error = %message, "Fetch failed, keeping last known data");
                    entry.error = Some(message);
                    if latest {
                        entry.invalidated = true;
                    }
                    false
                }
            };
            entry.bump();
            (succeeded, latest && invalidated_during_flight && entry.is_active())
        };

        if refetch_again {
            self.schedule(entries, key, 0);
        }

        if succeeded {
            let dependents: Vec<CacheKey> = entries
                .iter()
                .filter(|(_, e)| e.waiting_on_dependency && e.policy.depends_on == Some(key))
                .map(|(k, _)| *k)
                .collect();
            for dependent in dependents {
                self.schedule(entries, dependent, 0);
            }
        }
    }
}

async fn poll_entry(inner: Weak<Inner>, key: CacheKey, every: Duration, background_allowed: bool) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let registry = CacheRegistry { inner };
        if !background_allowed && !registry.is_focused() {
            continue;
        }
        let mut entries = registry.inner.entries.lock().await;
        registry.schedule(&mut entries, key, 0);
    }
}

/// Handle to one registered entry
#[derive(Clone)]
pub struct EntryHandle {
    key: CacheKey,
    registry: CacheRegistry,
}

impl EntryHandle {
    pub fn key(&self) -> CacheKey {
        self.key
    }

    pub async fn read(&self) -> EntrySnapshot {
        self.registry.read(self.key).await
    }

    pub async fn invalidate(&self) -> bool {
        self.registry.invalidate(self.key).await
    }

    pub async fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        self.registry.subscribe(self.key).await
    }

    pub async fn refetch(&self) -> EntrySnapshot {
        self.registry.refetch(self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counting_fetcher(counter: Arc<AtomicUsize>) -> Fetcher {
        fetcher(move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!(n))
            }
        })
    }

    async fn wait_until_loaded(registry: &CacheRegistry, key: CacheKey) -> EntrySnapshot {
        for _ in 0..200 {
            let snapshot = registry.peek(key).await;
            if !snapshot.is_loading && (snapshot.data.is_some() || snapshot.error.is_some()) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("entry {} never finished loading", key);
    }

    #[tokio::test]
    async fn test_first_read_is_loading_then_resolves() {
        let registry = CacheRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry
            .register(
                CacheKey::AdminDashboard,
                counting_fetcher(counter.clone()),
                RefreshPolicy::stale_after(Duration::from_secs(3600)),
            )
            .await;

        let first = registry.read(CacheKey::AdminDashboard).await;
        assert!(first.data.is_none());
        assert!(first.is_loading);
        assert!(first.is_stale);

        let loaded = wait_until_loaded(&registry, CacheKey::AdminDashboard).await;
        assert_eq!(loaded.data, Some(json!(1)));
        assert!(!loaded.is_stale);

        // Fresh data: no refetch
        let again = registry.read(CacheKey::AdminDashboard).await;
        assert!(!again.is_loading);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch_despite_stale_time() {
        let registry = CacheRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry
            .register(
                CacheKey::ActiveSession,
                counting_fetcher(counter.clone()),
                RefreshPolicy::stale_after(Duration::from_secs(3600)),
            )
            .await;
        registry.read(CacheKey::ActiveSession).await;
        wait_until_loaded(&registry, CacheKey::ActiveSession).await;

        assert!(registry.invalidate(CacheKey::ActiveSession).await);
        let peeked = registry.peek(CacheKey::ActiveSession).await;
        assert!(peeked.is_stale, "invalidated data must not be trusted");
        assert_eq!(peeked.data, Some(json!(1)), "last known data stays visible");

        let during = registry.read(CacheKey::ActiveSession).await;
        assert!(during.is_stale);
        assert!(during.is_loading);
        assert_eq!(during.data, Some(json!(1)));

        let after = wait_until_loaded(&registry, CacheKey::ActiveSession).await;
        assert_eq!(after.data, Some(json!(2)));
        assert!(!after.is_stale);
    }

    #[tokio::test]
    async fn test_slow_background_fetch_does_not_overwrite_newer_refetch() {
        let registry = CacheRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slow_first = {
            let calls = calls.clone();
            fetcher(move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                    Ok(json!(n))
                }
            })
        };
        registry
            .register(
                CacheKey::RecentSessions,
                slow_first,
                RefreshPolicy::stale_after(Duration::from_secs(3600)),
            )
            .await;

        // Background fetch #1 starts and stalls
        assert!(registry.read(CacheKey::RecentSessions).await.is_loading);

        let refetched = registry.refetch(CacheKey::RecentSessions).await;
        assert_eq!(refetched.data, Some(json!(2)));

        // Let the stalled fetch land
        tokio::time::sleep(Duration::from_millis(200)).await;
        let settled = registry.peek(CacheKey::RecentSessions).await;
        assert_eq!(settled.data, Some(json!(2)));
        assert!(!settled.is_loading);
        assert!(!settled.is_stale);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_key_is_reported_not_thrown() {
        let registry = CacheRegistry::new();
        let snapshot = registry.read(CacheKey::Reminders).await;
        assert!(snapshot.is_error());
        assert!(snapshot.data.is_none());
        assert!(!registry.invalidate(CacheKey::Reminders).await);
    }

    #[tokio::test]
    async fn test_fetch_error_sets_flag_and_keeps_last_data() {
        let registry = CacheRegistry::new();
        registry
            .register(
                CacheKey::Messages,
                fetcher(|| async { Err("connection refused".to_string()) }),
                RefreshPolicy::stale_after(Duration::from_secs(60)),
            )
            .await;
        registry.prime(CacheKey::Messages, json!(["hola"])).await;
        registry.invalidate(CacheKey::Messages).await;

        registry.read(CacheKey::Messages).await;
        let snapshot = wait_until_loaded(&registry, CacheKey::Messages).await;
        assert_eq!(snapshot.error.as_deref(), Some("connection refused"));
        assert_eq!(snapshot.data, Some(json!(["hola"])));
        assert!(snapshot.is_stale);
    }

    #[tokio::test]
    async fn test_dependent_entry_waits_for_prerequisite() {
        let registry = CacheRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o = order.clone();
        registry
            .register(
                CacheKey::CompanySettings,
                fetcher(move || {
                    let o = o.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        o.lock().unwrap().push("settings");
                        Ok(json!({"workingHoursPerDay": 8.0}))
                    }
                }),
                RefreshPolicy::stale_after(Duration::from_secs(600)),
            )
            .await;

        let o = order.clone();
        registry
            .register(
                CacheKey::RecentSessions,
                fetcher(move || {
                    let o = o.clone();
                    async move {
                        o.lock().unwrap().push("sessions");
                        Ok(json!([]))
                    }
                }),
                RefreshPolicy::stale_after(Duration::from_secs(30))
                    .depends_on(CacheKey::CompanySettings),
            )
            .await;

        let first = registry.read(CacheKey::RecentSessions).await;
        assert!(first.is_loading, "waiting on dependency counts as loading");

        let loaded = wait_until_loaded(&registry, CacheKey::RecentSessions).await;
        assert_eq!(loaded.data, Some(json!([])));
        assert_eq!(*order.lock().unwrap(), vec!["settings", "sessions"]);
    }

    #[tokio::test]
    async fn test_subscribed_entry_refetches_on_invalidate() {
        let registry = CacheRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry
            .register(
                CacheKey::UnreadMessages,
                counting_fetcher(counter.clone()),
                RefreshPolicy::stale_after(Duration::from_secs(3600)),
            )
            .await;

        let mut rx = registry.subscribe(CacheKey::UnreadMessages).await.unwrap();
        wait_until_loaded(&registry, CacheKey::UnreadMessages).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        registry.invalidate(CacheKey::UnreadMessages).await;
        let snapshot = {
            let mut result = None;
            for _ in 0..200 {
                let s = registry.peek(CacheKey::UnreadMessages).await;
                if s.data == Some(json!(2)) {
                    result = Some(s);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            result.expect("active entry should refetch without a read")
        };
        assert!(!snapshot.is_stale);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let registry = CacheRegistry::new();
        registry
            .register(
                CacheKey::Documents,
                counting_fetcher(Arc::new(AtomicUsize::new(0))),
                RefreshPolicy::default(),
            )
            .await;
        registry.prime(CacheKey::Documents, json!([])).await;

        registry.invalidate(CacheKey::Documents).await;
        let once = registry.stale_keys().await;
        registry.invalidate(CacheKey::Documents).await;
        let twice = registry.stale_keys().await;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_polling_refetches_and_stops_on_shutdown() {
        let registry = CacheRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry
            .register(
                CacheKey::ActiveBreak,
                counting_fetcher(counter.clone()),
                RefreshPolicy::stale_after(Duration::from_secs(3600))
                    .with_refetch_interval(Duration::from_millis(20))
                    .with_background_refetch(),
            )
            .await;

        registry.start_polling().await;
        assert_eq!(registry.poller_count().await, 1);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(counter.load(Ordering::SeqCst) >= 3);

        registry.shutdown().await;
        let stopped_at = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(counter.load(Ordering::SeqCst) <= stopped_at + 1);
    }

    #[tokio::test]
    async fn test_unfocused_view_skips_foreground_only_polling() {
        let registry = CacheRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry
            .register(
                CacheKey::AdminDashboard,
                counting_fetcher(counter.clone()),
                RefreshPolicy::stale_after(Duration::from_secs(3600))
                    .with_refetch_interval(Duration::from_millis(15)),
            )
            .await;

        registry.set_focused(false).await;
        registry.start_polling().await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_typed_read() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Counts {
            messages: u32,
        }

        let registry = CacheRegistry::new();
        registry
            .register(
                CacheKey::UnreadMessages,
                fetcher(|| async { Ok(json!({"messages": 4})) }),
                RefreshPolicy::default(),
            )
            .await;
        let snapshot = registry.refetch(CacheKey::UnreadMessages).await;
        assert_eq!(snapshot.data_as::<Counts>(), Some(Counts { messages: 4 }));
        assert_eq!(snapshot.data_as::<Vec<String>>(), None);
    }
}
