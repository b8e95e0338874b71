//! Data models
//!
//! Typed records for remote accounts, toots, and reconciliation results.
//! Remote payloads are decoded defensively: a missing field becomes its
//! default instead of failing the whole record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

fn unix_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

// =============================================================================
// Account
// =============================================================================

/// A remote account as returned by the platform
///
/// `id` is the platform's opaque, stable identifier; `acct` is the
/// human-referenceable handle (`user` or `user@domain`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub acct: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub statuses_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Day of the most recent toot (the platform reports a bare date)
    #[serde(default)]
    pub last_status_at: Option<NaiveDate>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
}

/// Persisted snapshot of a resolved account
///
/// One file per account under `accounts/<category>/<id>.json`,
/// overwritten on each successful resolution. Never auto-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub profile: Account,
    /// Most recent toots at resolution time (best-effort)
    #[serde(default)]
    pub recent_posts: Vec<Post>,
    pub fetched_at: DateTime<Utc>,
}

// =============================================================================
// Post (toot)
// =============================================================================

/// A toot
///
/// Immutable once persisted; one file per toot under `toots/<id>.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    /// HTML content (sanitized before persisting)
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub account: PostAuthor,
    /// Present when this toot is a boost of another toot
    #[serde(default)]
    pub reblog: Option<Box<Post>>,
    #[serde(default)]
    pub media_attachments: Vec<MediaAttachment>,
}

/// Author summary embedded in a toot payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostAuthor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Media file attached to a toot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaAttachment {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    /// Attachment kind as reported by the platform ("image", "video", ...)
    #[serde(default, rename = "type")]
    pub media_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

// =============================================================================
// Remote list
// =============================================================================

/// A named account list on the remote platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteList {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

// =============================================================================
// Category
// =============================================================================

/// A category of accounts the operator wants followed and grouped
///
/// Supplied by configuration; immutable per reconciliation pass.
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    /// Handles/URLs in the order they should be processed
    pub handles: Vec<String>,
}

// =============================================================================
// Reconciliation results
// =============================================================================

/// Terminal disposition of one handle within a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Resolved; follow and list membership converged
    Reconciled,
    /// Handle did not resolve to an account
    NotFound,
    /// Gave up after the single post-cooldown retry
    RateLimited,
    /// Any other remote error; corrected by a later pass
    Failed(String),
}

/// Per-handle outcome, in input order
#[derive(Debug, Clone)]
pub struct HandleOutcome {
    pub handle: String,
    pub disposition: Disposition,
}

/// Result of one reconciliation pass over one category
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub followed: u32,
    pub already_following: u32,
    pub added_to_list: u32,
    pub already_in_list: u32,
    pub not_found: u32,
    pub rate_limited: u32,
    pub failed: u32,
    /// One entry per processed handle, in input order
    pub outcomes: Vec<HandleOutcome>,
}

impl ReconcileReport {
    /// Number of mutating remote calls that succeeded this pass
    pub fn mutations(&self) -> u32 {
        self.followed + self.added_to_list
    }
}
