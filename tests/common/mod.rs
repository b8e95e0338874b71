//! Common test utilities
//!
//! `FakeClient` is a scripted, in-memory stand-in for the remote
//! platform: mutating calls change its state the way a real instance
//! would, every call is logged for counting, and individual operations
//! can be scripted to fail in sequence.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use tootherd::client::{AccountClient, ClientError, EventStream, StreamEvent};
use tootherd::data::{Account, Post, PostAuthor, RemoteList};

#[derive(Default)]
struct Inner {
    /// handle -> account
    accounts: HashMap<String, Account>,
    /// account id -> recent toots
    posts: HashMap<String, Vec<Post>>,
    lists: Vec<RemoteList>,
    /// list id -> member account ids
    members: HashMap<String, HashSet<String>>,
    following: HashSet<String>,
    next_list_id: u64,
    /// account id -> errors the next follow calls should return
    follow_errors: HashMap<String, VecDeque<ClientError>>,
    /// account id -> errors the next add-to-list calls should return
    add_errors: HashMap<String, VecDeque<ClientError>>,
    stream_events: Vec<Result<StreamEvent, ClientError>>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeClient {
    inner: Mutex<Inner>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, handle: &str, account: Account) {
        let mut inner = self.inner.lock().unwrap();
        inner.accounts.insert(handle.to_string(), account);
    }

    pub fn add_posts(&self, account_id: &str, posts: Vec<Post>) {
        let mut inner = self.inner.lock().unwrap();
        inner.posts.insert(account_id.to_string(), posts);
    }

    pub fn add_list(&self, id: &str, title: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.lists.push(RemoteList {
            id: id.to_string(),
            title: title.to_string(),
        });
    }

    /// Queue errors for upcoming follow calls on one account
    pub fn script_follow_errors(&self, account_id: &str, errors: Vec<ClientError>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .follow_errors
            .insert(account_id.to_string(), errors.into());
    }

    /// Queue errors for upcoming add-to-list calls on one account
    pub fn script_add_errors(&self, account_id: &str, errors: Vec<ClientError>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .add_errors
            .insert(account_id.to_string(), errors.into());
    }

    /// Events the next `subscribe_list` call will replay
    pub fn set_stream_events(&self, events: Vec<Result<StreamEvent, ClientError>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.stream_events = events;
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn is_following(&self, account_id: &str) -> bool {
        self.inner.lock().unwrap().following.contains(account_id)
    }

    pub fn list_member_ids(&self, list_id: &str) -> HashSet<String> {
        self.inner
            .lock()
            .unwrap()
            .members
            .get(list_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl AccountClient for FakeClient {
    async fn search_account(&self, handle: &str) -> Result<Option<Account>, ClientError> {
        self.record(format!("search:{}", handle));
        Ok(self.inner.lock().unwrap().accounts.get(handle).cloned())
    }

    async fn recent_posts(&self, account_id: &str, limit: usize) -> Result<Vec<Post>, ClientError> {
        self.record(format!("posts:{}", account_id));
        let mut posts = self
            .inner
            .lock()
            .unwrap()
            .posts
            .get(account_id)
            .cloned()
            .unwrap_or_default();
        posts.truncate(limit);
        Ok(posts)
    }

    async fn follow(&self, account_id: &str) -> Result<(), ClientError> {
        self.record(format!("follow:{}", account_id));
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner
            .follow_errors
            .get_mut(account_id)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        inner.following.insert(account_id.to_string());
        Ok(())
    }

    async fn lists(&self) -> Result<Vec<RemoteList>, ClientError> {
        self.record("lists".to_string());
        Ok(self.inner.lock().unwrap().lists.clone())
    }

    async fn create_list(&self, title: &str) -> Result<RemoteList, ClientError> {
        self.record(format!("create_list:{}", title));
        let mut inner = self.inner.lock().unwrap();
        inner.next_list_id += 1;
        let list = RemoteList {
            id: format!("L{}", inner.next_list_id),
            title: title.to_string(),
        };
        inner.lists.push(list.clone());
        Ok(list)
    }

    async fn list_members(&self, list_id: &str) -> Result<Vec<Account>, ClientError> {
        self.record(format!("members:{}", list_id));
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .members
            .get(list_id)
            .map(|ids| {
                ids.iter()
                    .map(|id| Account {
                        id: id.clone(),
                        ..Account::default()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_to_list(&self, list_id: &str, account_id: &str) -> Result<(), ClientError> {
        self.record(format!("add:{}:{}", list_id, account_id));
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner
            .add_errors
            .get_mut(account_id)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        inner
            .members
            .entry(list_id.to_string())
            .or_default()
            .insert(account_id.to_string());
        Ok(())
    }

    async fn following(&self) -> Result<Vec<Account>, ClientError> {
        self.record("following".to_string());
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .following
            .iter()
            .map(|id| Account {
                id: id.clone(),
                ..Account::default()
            })
            .collect())
    }

    async fn subscribe_list(&self, list_id: &str) -> Result<EventStream, ClientError> {
        self.record(format!("subscribe:{}", list_id));
        let events = std::mem::take(&mut self.inner.lock().unwrap().stream_events);
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn account(id: &str, acct: &str) -> Account {
    Account {
        id: id.to_string(),
        acct: acct.trim_start_matches('@').to_string(),
        username: acct
            .trim_start_matches('@')
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string(),
        display_name: format!("Account {}", id),
        url: format!("https://example.social/{}", acct),
        followers_count: 100,
        following_count: 50,
        statuses_count: 200,
        bot: false,
        ..Account::default()
    }
}

pub fn post(id: &str, minutes_ago: i64, content: &str) -> Post {
    Post {
        id: id.to_string(),
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        content: content.to_string(),
        url: Some(format!("https://example.social/toots/{}", id)),
        account: PostAuthor {
            id: "author-1".to_string(),
            acct: "author@example.social".to_string(),
            display_name: "Author".to_string(),
            avatar: None,
        },
        ..Post::default()
    }
}

pub fn boost(id: &str, of: Post) -> Post {
    Post {
        reblog: Some(Box::new(of)),
        ..post(id, 0, "")
    }
}
