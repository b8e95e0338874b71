//! Reconciliation engine tests
//!
//! Exercises the engine against the scripted fake client: convergence,
//! idempotence, partial failure, and the rate-limit retry policy.

mod common;

use std::time::Duration;

use common::{FakeClient, account, post};
use tempfile::TempDir;
use tokio::time::Instant;

use tootherd::client::ClientError;
use tootherd::data::{AccountRecord, Category, Disposition, RecordStore, account_namespace};
use tootherd::reconcile::{ReconcileState, Reconciler};

const COOLDOWN: Duration = Duration::from_secs(300);

fn category(handles: &[&str]) -> Category {
    Category {
        name: "media".to_string(),
        handles: handles.iter().map(|h| h.to_string()).collect(),
    }
}

fn reconciler() -> Reconciler {
    Reconciler::new(COOLDOWN, 5)
}

fn temp_store() -> (TempDir, RecordStore) {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::new(dir.path().join("store"));
    (dir, store)
}

#[tokio::test]
async fn first_pass_follows_and_lists_every_resolvable_handle() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));
    client.add_account("@b", account("2", "b@example.social"));

    let (_dir, store) = temp_store();
    let mut state = ReconcileState::default();
    let report = reconciler()
        .reconcile(&category(&["@a", "@b"]), &client, &store, &mut state)
        .await;

    assert_eq!(report.followed, 2);
    assert_eq!(report.added_to_list, 2);
    assert_eq!(report.not_found, 0);
    assert_eq!(report.failed, 0);

    assert!(client.is_following("1"));
    assert!(client.is_following("2"));
    assert_eq!(client.call_count("create_list:media"), 1);
    let members = client.list_member_ids("L1");
    assert!(members.contains("1") && members.contains("2"));

    // Outcomes follow input order.
    let handles: Vec<&str> = report.outcomes.iter().map(|o| o.handle.as_str()).collect();
    assert_eq!(handles, vec!["@a", "@b"]);
    assert!(
        report
            .outcomes
            .iter()
            .all(|o| o.disposition == Disposition::Reconciled)
    );
}

#[tokio::test]
async fn second_pass_makes_zero_mutating_calls() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));
    client.add_account("@b", account("2", "b@example.social"));

    let (_dir, store) = temp_store();
    let engine = reconciler();
    let cat = category(&["@a", "@b"]);
    let mut state = ReconcileState::default();

    engine.reconcile(&cat, &client, &store, &mut state).await;
    let follows_after_first = client.call_count("follow:");
    let adds_after_first = client.call_count("add:");

    state.begin_pass();
    let report = engine.reconcile(&cat, &client, &store, &mut state).await;

    assert_eq!(client.call_count("follow:"), follows_after_first);
    assert_eq!(client.call_count("add:"), adds_after_first);
    assert_eq!(client.call_count("create_list:"), 1);
    assert_eq!(report.mutations(), 0);
    assert_eq!(report.already_following, 2);
    assert_eq!(report.already_in_list, 2);

    // The following set is carried between passes; it is seeded once.
    assert_eq!(client.call_count("following"), 1);
}

#[tokio::test]
async fn unresolvable_handle_does_not_abort_the_pass() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));
    client.add_account("@c", account("3", "c@example.social"));

    let (_dir, store) = temp_store();
    let mut state = ReconcileState::default();
    let report = reconciler()
        .reconcile(&category(&["@a", "@b", "@c"]), &client, &store, &mut state)
        .await;

    assert_eq!(report.not_found, 1);
    assert_eq!(report.followed, 2);
    assert_eq!(client.call_count("search:@c"), 1);
    assert_eq!(report.outcomes[1].disposition, Disposition::NotFound);
    assert_eq!(report.outcomes[2].disposition, Disposition::Reconciled);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_follow_recovers_on_the_single_retry() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));
    client.script_follow_errors("1", vec![ClientError::RateLimited]);

    let (_dir, store) = temp_store();
    let mut state = ReconcileState::default();
    let start = Instant::now();
    let report = reconciler()
        .reconcile(&category(&["@a"]), &client, &store, &mut state)
        .await;

    assert!(start.elapsed() >= COOLDOWN);
    assert_eq!(client.call_count("follow:1"), 2);
    assert_eq!(report.followed, 1);
    assert_eq!(report.rate_limited, 0);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_follow_gives_up_after_one_retry() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));
    client.add_account("@b", account("2", "b@example.social"));
    client.script_follow_errors("1", vec![ClientError::RateLimited, ClientError::RateLimited]);

    let (_dir, store) = temp_store();
    let mut state = ReconcileState::default();
    let report = reconciler()
        .reconcile(&category(&["@a", "@b"]), &client, &store, &mut state)
        .await;

    // Initial attempt plus exactly one retry, then the handle is given up.
    assert_eq!(client.call_count("follow:1"), 2);
    assert_eq!(report.rate_limited, 1);
    assert_eq!(report.outcomes[0].disposition, Disposition::RateLimited);

    // The rate-limited handle skips list membership for this pass.
    assert_eq!(client.call_count("add:L1:1"), 0);

    // The next handle is unaffected and keeps its position.
    assert_eq!(report.outcomes[1].handle, "@b");
    assert_eq!(report.outcomes[1].disposition, Disposition::Reconciled);
    assert!(client.is_following("2"));
}

#[tokio::test]
async fn already_following_from_remote_is_success() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));
    client.script_follow_errors("1", vec![ClientError::AlreadyDone]);

    let (_dir, store) = temp_store();
    let mut state = ReconcileState::default();
    let report = reconciler()
        .reconcile(&category(&["@a"]), &client, &store, &mut state)
        .await;

    assert_eq!(report.already_following, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.outcomes[0].disposition, Disposition::Reconciled);
}

#[tokio::test]
async fn transient_follow_error_is_recorded_and_pass_continues() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));
    client.add_account("@b", account("2", "b@example.social"));
    client.script_follow_errors(
        "1",
        vec![ClientError::Transient("connection reset".to_string())],
    );

    let (_dir, store) = temp_store();
    let mut state = ReconcileState::default();
    let report = reconciler()
        .reconcile(&category(&["@a", "@b"]), &client, &store, &mut state)
        .await;

    assert_eq!(report.failed, 1);
    assert!(matches!(
        report.outcomes[0].disposition,
        Disposition::Failed(_)
    ));
    assert!(client.is_following("2"));
}

#[tokio::test]
async fn existing_list_is_matched_case_insensitively() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));
    client.add_list("L9", "Media");

    let (_dir, store) = temp_store();
    let mut state = ReconcileState::default();
    reconciler()
        .reconcile(&category(&["@a"]), &client, &store, &mut state)
        .await;

    assert_eq!(client.call_count("create_list:"), 0);
    assert!(client.list_member_ids("L9").contains("1"));
}

#[tokio::test]
async fn repeat_call_with_same_state_skips_processed_handles() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));

    let (_dir, store) = temp_store();
    let engine = reconciler();
    let cat = category(&["@a"]);
    let mut state = ReconcileState::default();

    engine.reconcile(&cat, &client, &store, &mut state).await;
    // No begin_pass: the handle is still marked processed.
    let report = engine.reconcile(&cat, &client, &store, &mut state).await;

    assert_eq!(client.call_count("search:@a"), 1);
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn account_snapshot_is_persisted_under_the_category_namespace() {
    let client = FakeClient::new();
    client.add_account("@a", account("1", "a@example.social"));
    client.add_posts(
        "1",
        vec![post("t1", 5, "<p>one</p>"), post("t2", 10, "<p>two</p>")],
    );

    let (_dir, store) = temp_store();
    let mut state = ReconcileState::default();
    reconciler()
        .reconcile(&category(&["@a"]), &client, &store, &mut state)
        .await;

    let record: AccountRecord = store
        .get(&account_namespace("media"), "1")
        .await
        .unwrap()
        .expect("snapshot should exist");
    assert_eq!(record.profile.acct, "a@example.social");
    assert_eq!(record.recent_posts.len(), 2);
    assert_eq!(record.recent_posts[0].id, "t1");
}

#[tokio::test]
async fn list_fetch_failure_degrades_to_follow_only() {
    // A client whose list endpoints always fail still converges follows.
    struct ListlessClient(FakeClient);

    #[async_trait::async_trait]
    impl tootherd::client::AccountClient for ListlessClient {
        async fn search_account(
            &self,
            handle: &str,
        ) -> Result<Option<tootherd::data::Account>, ClientError> {
            self.0.search_account(handle).await
        }
        async fn recent_posts(
            &self,
            account_id: &str,
            limit: usize,
        ) -> Result<Vec<tootherd::data::Post>, ClientError> {
            self.0.recent_posts(account_id, limit).await
        }
        async fn follow(&self, account_id: &str) -> Result<(), ClientError> {
            self.0.follow(account_id).await
        }
        async fn lists(&self) -> Result<Vec<tootherd::data::RemoteList>, ClientError> {
            Err(ClientError::Transient("lists down".to_string()))
        }
        async fn create_list(
            &self,
            title: &str,
        ) -> Result<tootherd::data::RemoteList, ClientError> {
            self.0.create_list(title).await
        }
        async fn list_members(
            &self,
            list_id: &str,
        ) -> Result<Vec<tootherd::data::Account>, ClientError> {
            self.0.list_members(list_id).await
        }
        async fn add_to_list(&self, list_id: &str, account_id: &str) -> Result<(), ClientError> {
            self.0.add_to_list(list_id, account_id).await
        }
        async fn following(&self) -> Result<Vec<tootherd::data::Account>, ClientError> {
            self.0.following().await
        }
        async fn subscribe_list(
            &self,
            list_id: &str,
        ) -> Result<tootherd::client::EventStream, ClientError> {
            self.0.subscribe_list(list_id).await
        }
    }

    let inner = FakeClient::new();
    inner.add_account("@a", account("1", "a@example.social"));
    let client = ListlessClient(inner);

    let (_dir, store) = temp_store();
    let mut state = ReconcileState::default();
    let report = reconciler()
        .reconcile(&category(&["@a"]), &client, &store, &mut state)
        .await;

    assert_eq!(report.followed, 1);
    assert_eq!(report.added_to_list, 0);
    assert_eq!(report.already_in_list, 0);
    assert_eq!(report.outcomes[0].disposition, Disposition::Reconciled);
}
