//! Worker scheduling
//!
//! One long-lived task per category (reconciliation) and one per stream
//! source (ingestion). Engine calls stay synchronous within their task;
//! a pass always finishes before the next one starts, so the same
//! category never has overlapping passes.

use tokio::task::JoinHandle;

use crate::AppState;
use crate::cache::run_list_listener;
use crate::client::AccountClient;
use crate::data::Category;
use crate::metrics::RECONCILE_PASSES_TOTAL;
use crate::reconcile::{ReconcileState, Reconciler};

/// Spawn all configured workers
pub fn spawn_workers(state: &AppState) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for category in state.config.categories() {
        handles.push(spawn_reconcile_worker(state.clone(), category));
    }

    for source in &state.config.stream.sources {
        handles.push(spawn_stream_worker(state.clone(), source.clone()));
    }

    tracing::info!(workers = handles.len(), "Workers spawned");
    handles
}

/// Spawn the reconciliation loop for one category
///
/// The worker owns its `ReconcileState`: the following set amortizes
/// across passes, the processed set is cleared before each pass so every
/// pass re-converges remote state.
fn spawn_reconcile_worker(state: AppState, category: Category) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reconciler = Reconciler::new(
            state.config.reconcile.cooldown(),
            state.config.reconcile.recent_posts_limit,
        );
        let mut pass_state = ReconcileState::default();
        let mut interval = tokio::time::interval(state.config.reconcile.interval());

        loop {
            interval.tick().await;

            pass_state.begin_pass();
            let report = reconciler
                .reconcile(
                    &category,
                    state.client.as_ref(),
                    &state.store,
                    &mut pass_state,
                )
                .await;

            RECONCILE_PASSES_TOTAL
                .with_label_values(&[category.name.as_str()])
                .inc();

            if report.failed > 0 || report.rate_limited > 0 {
                tracing::warn!(
                    category = %category.name,
                    failed = report.failed,
                    rate_limited = report.rate_limited,
                    "Pass left work for the next cycle"
                );
            }
        }
    })
}

/// Spawn the stream ingestion loop for one source
///
/// The listener runs until the stream drops, then the worker sleeps the
/// reconnect cooldown and tries again. The source's list may not exist
/// until the first reconciliation pass creates it.
fn spawn_stream_worker(state: AppState, source: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reconnect = state.config.stream.reconnect_cooldown();

        loop {
            match resolve_list_id(state.client.as_ref(), &source).await {
                Some(list_id) => {
                    if let Err(error) =
                        run_list_listener(state.client.as_ref(), &list_id, &state.cache).await
                    {
                        tracing::warn!(source = %source, %error, "Stream listener stopped");
                    }
                }
                None => {
                    tracing::warn!(source = %source, "List for stream source not available yet");
                }
            }

            tokio::time::sleep(reconnect).await;
        }
    })
}

async fn resolve_list_id(client: &dyn AccountClient, name: &str) -> Option<String> {
    let lists = match client.lists().await {
        Ok(lists) => lists,
        Err(error) => {
            tracing::warn!(source = %name, %error, "Could not fetch lists for stream source");
            return None;
        }
    };

    let wanted = name.to_lowercase();
    lists
        .into_iter()
        .find(|l| l.title.to_lowercase() == wanted)
        .map(|l| l.id)
}
