//! In-memory conversation thread store with TTL eviction.
//!
//! Threads are exclusively owned by this process: state is lost on
//! restart, which is acceptable for a non-durable conversation cache.
//! A background sweeper evicts threads whose last update is older than
//! the TTL; tests drive eviction deterministically through
//! [`ThreadStore::sweep_at`] instead of waiting on real time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::context::render_system_prompt;
use crate::llm::provider::Message;

/// How long an untouched thread survives.
pub const DEFAULT_THREAD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the background sweeper runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
struct Thread {
    messages: Vec<Message>,
    context: HashMap<String, String>,
    last_updated: Instant,
}

impl Thread {
    fn new(now: Instant) -> Self {
        Self {
            messages: Vec::new(),
            context: HashMap::new(),
            last_updated: now,
        }
    }
}

/// Keyed store of conversation threads.
pub struct ThreadStore {
    threads: Mutex<HashMap<String, Thread>>,
    ttl: Duration,
}

impl ThreadStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    // Poisoned-lock recovery keeps the store usable after a panic in an
    // unrelated handler; the map itself is never left mid-mutation.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Thread>> {
        self.threads.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a message, creating the thread if absent.
    pub fn append(&self, thread_id: &str, message: Message) {
        let mut threads = self.lock();
        let now = Instant::now();
        let thread = threads
            .entry(thread_id.to_owned())
            .or_insert_with(|| Thread::new(now));
        thread.messages.push(message);
        thread.last_updated = now;
    }

    /// Replace the thread's context map wholesale, creating if absent.
    pub fn set_context(&self, thread_id: &str, context: HashMap<String, String>) {
        let mut threads = self.lock();
        let now = Instant::now();
        let thread = threads
            .entry(thread_id.to_owned())
            .or_insert_with(|| Thread::new(now));
        thread.context = context;
        thread.last_updated = now;
    }

    /// `[system, ...history]` for a completion request. A missing thread
    /// reads as an empty thread: just the base system prompt.
    pub fn build_prompt_messages(&self, thread_id: &str) -> Vec<Message> {
        let threads = self.lock();
        match threads.get(thread_id) {
            Some(thread) => {
                let mut messages = Vec::with_capacity(thread.messages.len() + 1);
                messages.push(Message::system(render_system_prompt(&thread.context)));
                messages.extend(thread.messages.iter().cloned());
                messages
            }
            None => vec![Message::system(render_system_prompt(&HashMap::new()))],
        }
    }

    /// The thread's current context map (empty for a missing thread).
    pub fn context(&self, thread_id: &str) -> HashMap<String, String> {
        let threads = self.lock();
        threads
            .get(thread_id)
            .map(|t| t.context.clone())
            .unwrap_or_default()
    }

    /// Remove the thread entirely.
    pub fn clear(&self, thread_id: &str) {
        self.lock().remove(thread_id);
    }

    /// Number of live threads.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Evict threads older than the TTL as of now.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evict threads whose age at `now` exceeds the TTL. Returns the
    /// number evicted. Exposed separately so tests can fabricate `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let ttl = self.ttl;
        let mut threads = self.lock();
        let before = threads.len();
        threads.retain(|_, t| now.saturating_duration_since(t.last_updated) <= ttl);
        before - threads.len()
    }

    /// Start the background sweeper. The returned handle stops it; the
    /// task also dies with the runtime, so dropping the handle on
    /// shutdown is fine.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let store = Arc::clone(self);
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh store
            // is not swept at startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = store.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, "thread sweep");
                        }
                    }
                }
            }
        });
        SweeperHandle { token, handle }
    }
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new(DEFAULT_THREAD_TTL)
    }
}

/// Stop handle for the background sweeper task.
pub struct SweeperHandle {
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to exit.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::Role;

    #[test]
    fn append_creates_thread_and_preserves_order() {
        let store = ThreadStore::default();
        store.append("t1", Message::user("first"));
        store.append("t1", Message::assistant("second"));
        store.append("t1", Message::user("third"));

        let messages = store.build_prompt_messages("t1");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "first");
        assert_eq!(messages[2].content, "second");
        assert_eq!(messages[3].content, "third");
    }

    #[test]
    fn missing_thread_reads_as_empty() {
        let store = ThreadStore::default();
        let messages = store.build_prompt_messages("nope");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
        assert!(store.context("nope").is_empty());
    }

    #[test]
    fn set_context_creates_thread_and_feeds_prompt() {
        let store = ThreadStore::default();
        let mut context = HashMap::new();
        context.insert("destination".to_owned(), "Portugal".to_owned());
        store.set_context("t1", context);

        let messages = store.build_prompt_messages("t1");
        assert!(messages[0].content.contains("Destination: Portugal"));
    }

    #[test]
    fn set_context_replaces_wholesale() {
        let store = ThreadStore::default();
        let mut first = HashMap::new();
        first.insert("destination".to_owned(), "Portugal".to_owned());
        store.set_context("t1", first);

        let mut second = HashMap::new();
        second.insert("budget".to_owned(), "€2000/month".to_owned());
        store.set_context("t1", second);

        let prompt = &store.build_prompt_messages("t1")[0].content;
        assert!(!prompt.contains("Portugal"));
        assert!(prompt.contains("€2000/month"));
    }

    #[test]
    fn clear_removes_thread() {
        let store = ThreadStore::default();
        store.append("t1", Message::user("hi"));
        assert_eq!(store.len(), 1);
        store.clear("t1");
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_evicts_only_expired_threads() {
        let store = ThreadStore::new(Duration::from_secs(60));
        store.append("old", Message::user("hello"));
        store.append("young", Message::user("hello"));

        // "old" aged past the TTL, "young" has not.
        let future = Instant::now() + Duration::from_secs(61);
        {
            let mut threads = store.lock();
            if let Some(t) = threads.get_mut("young") {
                t.last_updated = future;
            }
        }
        let evicted = store.sweep_at(future);
        assert_eq!(evicted, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.build_prompt_messages("young").len(), 2);
    }

    #[test]
    fn sweep_before_ttl_keeps_everything() {
        let store = ThreadStore::new(Duration::from_secs(60));
        store.append("t1", Message::user("hello"));
        let soon = Instant::now() + Duration::from_secs(59);
        assert_eq!(store.sweep_at(soon), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_refreshes_age() {
        let store = ThreadStore::new(Duration::from_secs(60));
        store.append("t1", Message::user("first"));
        // A later append moves last_updated forward, so the thread
        // survives a sweep that would have caught the original stamp.
        store.append("t1", Message::user("second"));
        assert_eq!(store.sweep_at(Instant::now()), 0);
    }

    #[tokio::test]
    async fn sweeper_start_stop() {
        let store = Arc::new(ThreadStore::new(Duration::ZERO));
        let handle = store.start_sweeper(Duration::from_millis(5));
        store.append("t1", Message::user("hi"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.is_empty(), "zero-TTL sweeper evicts the thread");
        handle.stop().await;
    }
}
