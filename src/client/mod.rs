//! Remote account client
//!
//! `AccountClient` is the seam between the engines and the platform's API.
//! The engines only ever call through this trait; `MastodonClient` is the
//! production implementation, tests substitute a scripted fake.

mod mastodon;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::data::{Account, Post, RemoteList};

pub use mastodon::MastodonClient;

/// Per-operation remote API error
///
/// The taxonomy the reconciliation engine dispatches on: `RateLimited`
/// gets one post-cooldown retry, `NotFound` and `AlreadyDone` are
/// normalized outcomes, everything else is recorded and corrected by the
/// next scheduled pass.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The platform asked us to slow down (HTTP 429)
    #[error("rate limited by remote API")]
    RateLimited,

    /// No such resource
    #[error("no matching resource")]
    NotFound,

    /// The requested state already holds ("already following", "already taken")
    #[error("remote state already satisfied")]
    AlreadyDone,

    /// Network/server trouble; a later pass will retry
    #[error("transient remote error: {0}")]
    Transient(String),

    /// Rejected outright; retrying will not help
    #[error("permanent remote error: {0}")]
    Permanent(String),
}

/// An event from a list's live stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A new or edited toot
    Update(Post),
    /// The platform deleted a toot
    Delete(String),
}

/// Fallible push-style stream of list events
pub type EventStream = BoxStream<'static, Result<StreamEvent, ClientError>>;

/// Capability set consumed from the remote platform
///
/// All calls are issued with an already-authenticated identity; obtaining
/// credentials is the caller's precondition.
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Resolve a handle or profile URL to an account, if any
    async fn search_account(&self, handle: &str) -> Result<Option<Account>, ClientError>;

    /// Most recent toots of an account, newest first
    async fn recent_posts(&self, account_id: &str, limit: usize) -> Result<Vec<Post>, ClientError>;

    /// Follow an account
    async fn follow(&self, account_id: &str) -> Result<(), ClientError>;

    /// All lists owned by the authenticated identity
    async fn lists(&self) -> Result<Vec<RemoteList>, ClientError>;

    /// Create a list with the given title
    async fn create_list(&self, title: &str) -> Result<RemoteList, ClientError>;

    /// Accounts currently in a list
    async fn list_members(&self, list_id: &str) -> Result<Vec<Account>, ClientError>;

    /// Add an account to a list
    async fn add_to_list(&self, list_id: &str, account_id: &str) -> Result<(), ClientError>;

    /// Accounts the authenticated identity follows
    async fn following(&self) -> Result<Vec<Account>, ClientError>;

    /// Subscribe to a list's live stream
    async fn subscribe_list(&self, list_id: &str) -> Result<EventStream, ClientError>;
}
