//! List reconciliation engine
//!
//! Drives one category's desired accounts toward "followed + member of the
//! category's remote list", with the minimum number of mutating calls. No
//! per-handle error aborts a pass; outcomes are collected in a report and
//! the next scheduled pass corrects what this one could not.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::client::{AccountClient, ClientError};
use crate::data::{
    Account, AccountRecord, Category, Disposition, HandleOutcome, ReconcileReport, RecordStore,
    RemoteList, account_namespace,
};
use crate::metrics::{
    FOLLOWS_TOTAL, HANDLES_FAILED_TOTAL, HANDLES_NOT_FOUND_TOTAL, LIST_ADDS_TOTAL,
    RATE_LIMIT_HITS_TOTAL,
};

/// Caller-owned state carried between engine calls
///
/// The engine reads and mutates these sets, never resets them. The
/// scheduler clears `processed` between passes and keeps `following`
/// for the lifetime of its worker.
#[derive(Debug, Default)]
pub struct ReconcileState {
    /// Account IDs the authenticated identity follows; seeded lazily
    /// from the client exactly once per pass if unset
    pub following: Option<HashSet<String>>,
    /// Handles already resolved this pass; skipped on repeat calls
    pub processed: HashSet<String>,
}

impl ReconcileState {
    /// Prepare for a fresh pass: forget per-pass handle progress,
    /// keep the amortized following set
    pub fn begin_pass(&mut self) {
        self.processed.clear();
    }
}

/// List reconciliation engine
pub struct Reconciler {
    /// Fixed cooldown before the single rate-limit retry
    cooldown: Duration,
    /// Toots captured per account snapshot
    recent_posts_limit: usize,
}

impl Reconciler {
    pub fn new(cooldown: Duration, recent_posts_limit: usize) -> Self {
        Self {
            cooldown,
            recent_posts_limit,
        }
    }

    /// Run one reconciliation pass over one category
    ///
    /// Handles are processed strictly in input order. "Already
    /// following" and "already in list" count as success, which is what
    /// makes repeated passes converge without duplicating side effects.
    pub async fn reconcile(
        &self,
        category: &Category,
        client: &dyn AccountClient,
        store: &RecordStore,
        state: &mut ReconcileState,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut seeded = state.following.is_some();
        if !seeded {
            match client.following().await {
                Ok(accounts) => {
                    state.following = Some(accounts.into_iter().map(|a| a.id).collect());
                    seeded = true;
                }
                Err(error) => tracing::warn!(
                    category = %category.name,
                    %error,
                    "Could not seed following set; relying on idempotent follow semantics"
                ),
            }
        }
        // On seed failure, work against a scratch set this pass and leave
        // `state.following` unset so the next pass retries the query.
        let mut following = state.following.take().unwrap_or_default();

        let list = self.resolve_list(client, &category.name).await;
        let mut members: HashSet<String> = match list.as_ref() {
            Some(list) => match client.list_members(&list.id).await {
                Ok(accounts) => accounts.into_iter().map(|a| a.id).collect(),
                Err(error) => {
                    tracing::warn!(
                        category = %category.name,
                        list_id = %list.id,
                        %error,
                        "Could not fetch list membership; adds fall back on idempotent semantics"
                    );
                    HashSet::new()
                }
            },
            None => HashSet::new(),
        };

        for handle in &category.handles {
            if state.processed.contains(handle) {
                continue;
            }

            let disposition = self
                .reconcile_handle(
                    handle,
                    client,
                    store,
                    &category.name,
                    list.as_ref(),
                    &mut members,
                    &mut following,
                    &mut state.processed,
                    &mut report,
                )
                .await;

            match &disposition {
                Disposition::Reconciled => {}
                Disposition::NotFound => {
                    report.not_found += 1;
                    HANDLES_NOT_FOUND_TOTAL.inc();
                }
                Disposition::RateLimited => report.rate_limited += 1,
                Disposition::Failed(reason) => {
                    report.failed += 1;
                    HANDLES_FAILED_TOTAL.inc();
                    tracing::warn!(category = %category.name, handle = %handle, reason = %reason, "Handle failed");
                }
            }

            report.outcomes.push(HandleOutcome {
                handle: handle.clone(),
                disposition,
            });
        }

        if seeded {
            state.following = Some(following);
        }

        tracing::info!(
            category = %category.name,
            followed = report.followed,
            already_following = report.already_following,
            added_to_list = report.added_to_list,
            already_in_list = report.already_in_list,
            not_found = report.not_found,
            rate_limited = report.rate_limited,
            failed = report.failed,
            "Reconciliation pass complete"
        );

        report
    }

    /// Resolve or create the category's remote list, once per pass
    ///
    /// Title match is case-insensitive. If the remote refuses both the
    /// lookup and the create, the pass runs follow-only.
    async fn resolve_list(
        &self,
        client: &dyn AccountClient,
        category_name: &str,
    ) -> Option<RemoteList> {
        let lists = match client.lists().await {
            Ok(lists) => lists,
            Err(error) => {
                tracing::warn!(category = %category_name, %error, "Could not fetch lists; running follow-only pass");
                return None;
            }
        };

        let wanted = category_name.to_lowercase();
        if let Some(existing) = lists.into_iter().find(|l| l.title.to_lowercase() == wanted) {
            return Some(existing);
        }

        match client.create_list(category_name).await {
            Ok(list) => {
                tracing::info!(category = %category_name, list_id = %list.id, "Created remote list");
                Some(list)
            }
            Err(error) => {
                tracing::warn!(category = %category_name, %error, "Could not create list; running follow-only pass");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconcile_handle(
        &self,
        handle: &str,
        client: &dyn AccountClient,
        store: &RecordStore,
        category_name: &str,
        list: Option<&RemoteList>,
        members: &mut HashSet<String>,
        following: &mut HashSet<String>,
        processed: &mut HashSet<String>,
        report: &mut ReconcileReport,
    ) -> Disposition {
        let account = match self
            .with_rate_limit_retry(|| client.search_account(handle))
            .await
        {
            Ok(Some(account)) => account,
            Ok(None) | Err(ClientError::NotFound) => {
                processed.insert(handle.to_string());
                return Disposition::NotFound;
            }
            // Resolution never happened; leave the handle unprocessed so
            // a retried pass resolves it.
            Err(ClientError::RateLimited) => return Disposition::RateLimited,
            Err(error) => return Disposition::Failed(error.to_string()),
        };
        processed.insert(handle.to_string());

        self.snapshot_account(client, store, category_name, &account)
            .await;

        if following.contains(&account.id) {
            report.already_following += 1;
        } else {
            match self
                .with_rate_limit_retry(|| client.follow(&account.id))
                .await
            {
                Ok(()) => {
                    following.insert(account.id.clone());
                    report.followed += 1;
                    FOLLOWS_TOTAL.inc();
                }
                Err(ClientError::AlreadyDone) => {
                    following.insert(account.id.clone());
                    report.already_following += 1;
                }
                Err(ClientError::RateLimited) => return Disposition::RateLimited,
                Err(error) => return Disposition::Failed(error.to_string()),
            }
        }

        let Some(list) = list else {
            return Disposition::Reconciled;
        };

        if members.contains(&account.id) {
            report.already_in_list += 1;
        } else {
            match self
                .with_rate_limit_retry(|| client.add_to_list(&list.id, &account.id))
                .await
            {
                Ok(()) => {
                    members.insert(account.id.clone());
                    report.added_to_list += 1;
                    LIST_ADDS_TOTAL.inc();
                }
                Err(ClientError::AlreadyDone) => {
                    members.insert(account.id.clone());
                    report.already_in_list += 1;
                }
                Err(ClientError::RateLimited) => return Disposition::RateLimited,
                Err(error) => return Disposition::Failed(error.to_string()),
            }
        }

        Disposition::Reconciled
    }

    /// Persist the account's profile snapshot, best-effort
    ///
    /// Snapshot trouble never changes a handle's disposition.
    async fn snapshot_account(
        &self,
        client: &dyn AccountClient,
        store: &RecordStore,
        category_name: &str,
        account: &Account,
    ) {
        let recent_posts = match client
            .recent_posts(&account.id, self.recent_posts_limit)
            .await
        {
            Ok(posts) => posts,
            Err(error) => {
                tracing::debug!(account_id = %account.id, %error, "Could not fetch recent toots for snapshot");
                Vec::new()
            }
        };

        let record = AccountRecord {
            profile: account.clone(),
            recent_posts,
            fetched_at: chrono::Utc::now(),
        };

        if let Err(error) = store
            .put(&account_namespace(category_name), &account.id, &record)
            .await
        {
            tracing::warn!(account_id = %account.id, %error, "Could not persist account snapshot");
        }
    }

    /// Run a remote call, retrying exactly once after the cooldown if the
    /// platform answers with a rate limit
    async fn with_rate_limit_retry<T, F, Fut>(&self, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        match op().await {
            Err(ClientError::RateLimited) => {
                RATE_LIMIT_HITS_TOTAL.inc();
                tracing::warn!(
                    cooldown_secs = self.cooldown.as_secs(),
                    "Rate limited; cooling down before one retry"
                );
                tokio::time::sleep(self.cooldown).await;
                op().await
            }
            result => result,
        }
    }
}
