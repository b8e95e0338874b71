//! Live content cache
//!
//! Persists each incoming toot exactly once per ID and serves the most
//! recent slice inside a retention window. Two dedup layers with
//! deliberately different lifetimes:
//! - the record store survives restarts and dedups by ID overwrite
//! - the in-process seen set dedups what this run has already surfaced

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use futures::StreamExt;

use crate::client::{AccountClient, ClientError, StreamEvent};
use crate::data::{Post, RecordStore, TOOT_NAMESPACE};
use crate::metrics::{
    BOOSTS_SKIPPED_TOTAL, CORRUPT_RECORDS_TOTAL, SEEN_SET_SIZE, STORE_WRITE_ERRORS_TOTAL,
    TOOTS_INGESTED_TOTAL,
};

/// Deduplicated, time-windowed toot cache
pub struct ContentCache {
    store: Arc<RecordStore>,
    /// Toot IDs already surfaced by `query` during this process lifetime
    seen: Mutex<HashSet<String>>,
}

impl ContentCache {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Persist one toot, last-write-wins
    ///
    /// The HTML content is sanitized before it touches disk. A write
    /// failure is logged and dropped: the stream will not redeliver, and
    /// one lost toot must not take the listener down.
    pub async fn ingest(&self, post: &Post) {
        let mut post = post.clone();
        post.content = ammonia::clean(&post.content);

        match self.store.put(TOOT_NAMESPACE, &post.id, &post).await {
            Ok(()) => {
                TOOTS_INGESTED_TOTAL.inc();
                tracing::debug!(toot_id = %post.id, author = %post.account.acct, "Toot cached");
            }
            Err(error) => {
                STORE_WRITE_ERRORS_TOTAL.inc();
                tracing::warn!(toot_id = %post.id, %error, "Failed to cache toot; dropping");
            }
        }
    }

    /// Serve the most recent `max_items` not-yet-surfaced toots within
    /// `retention`, oldest of the returned batch first
    ///
    /// Expiry is logical: records older than the window stay on disk but
    /// are excluded here. Survivors enter the seen set before truncation,
    /// so each toot is returned at most once per process lifetime.
    pub async fn query(&self, max_items: usize, retention: Duration) -> Vec<Post> {
        let entries = match self.store.scan(TOOT_NAMESPACE).await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(%error, "Content namespace scan failed");
                return Vec::new();
            }
        };

        let now = SystemTime::now();
        let fresh: Vec<_> = entries
            .into_iter()
            .filter(|entry| {
                let age = now
                    .duration_since(entry.modified)
                    .unwrap_or(Duration::ZERO);
                age <= retention
            })
            .collect();

        let unseen: Vec<_> = {
            let mut seen = self.seen.lock().expect("seen set lock poisoned");
            let unseen = fresh
                .into_iter()
                .filter(|entry| seen.insert(entry.id.clone()))
                .collect();
            SEEN_SET_SIZE.set(seen.len() as i64);
            unseen
        };

        let mut posts = Vec::with_capacity(unseen.len());
        for entry in &unseen {
            match self.store.read_entry::<Post>(entry).await {
                Ok(post) => posts.push(post),
                Err(error) => {
                    CORRUPT_RECORDS_TOTAL.inc();
                    tracing::warn!(toot_id = %entry.id, %error, "Skipping unreadable cached toot");
                }
            }
        }

        posts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if posts.len() > max_items {
            posts.drain(..posts.len() - max_items);
        }
        posts
    }
}

/// Consume a list's live stream into the cache
///
/// Boosts are logged and skipped; only original toots drive display.
/// Returns when the stream ends or fails; the caller reconnects after a
/// cooldown in either case.
pub async fn run_list_listener(
    client: &dyn AccountClient,
    list_id: &str,
    cache: &ContentCache,
) -> Result<(), ClientError> {
    let mut events = client.subscribe_list(list_id).await?;
    tracing::info!(list_id = %list_id, "Listening to list stream");

    while let Some(event) = events.next().await {
        match event {
            Ok(StreamEvent::Update(post)) => {
                if post.reblog.is_some() {
                    BOOSTS_SKIPPED_TOTAL.inc();
                    tracing::debug!(toot_id = %post.id, "Skipping boost from stream");
                    continue;
                }
                cache.ingest(&post).await;
            }
            Ok(StreamEvent::Delete(toot_id)) => {
                // Cached records are immutable; the retention window
                // handles disappearance.
                tracing::debug!(toot_id = %toot_id, "Ignoring delete event");
            }
            Err(error) => {
                tracing::warn!(list_id = %list_id, %error, "List stream error");
                return Err(error);
            }
        }
    }

    tracing::info!(list_id = %list_id, "List stream ended");
    Ok(())
}
