//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Reconciliation Metrics
    pub static ref RECONCILE_PASSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tootherd_reconcile_passes_total", "Total number of reconciliation passes"),
        &["category"]
    ).expect("metric can be created");
    pub static ref FOLLOWS_TOTAL: IntCounter = IntCounter::new(
        "tootherd_follows_total",
        "Total number of successful follow calls"
    ).expect("metric can be created");
    pub static ref LIST_ADDS_TOTAL: IntCounter = IntCounter::new(
        "tootherd_list_adds_total",
        "Total number of successful add-to-list calls"
    ).expect("metric can be created");
    pub static ref HANDLES_NOT_FOUND_TOTAL: IntCounter = IntCounter::new(
        "tootherd_handles_not_found_total",
        "Total number of handles that did not resolve"
    ).expect("metric can be created");
    pub static ref HANDLES_FAILED_TOTAL: IntCounter = IntCounter::new(
        "tootherd_handles_failed_total",
        "Total number of handles recorded as failed"
    ).expect("metric can be created");
    pub static ref RATE_LIMIT_HITS_TOTAL: IntCounter = IntCounter::new(
        "tootherd_rate_limit_hits_total",
        "Total number of rate-limit responses from the remote API"
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref TOOTS_INGESTED_TOTAL: IntCounter = IntCounter::new(
        "tootherd_toots_ingested_total",
        "Total number of toots persisted by the content cache"
    ).expect("metric can be created");
    pub static ref BOOSTS_SKIPPED_TOTAL: IntCounter = IntCounter::new(
        "tootherd_boosts_skipped_total",
        "Total number of boost events skipped by the stream listener"
    ).expect("metric can be created");
    pub static ref CORRUPT_RECORDS_TOTAL: IntCounter = IntCounter::new(
        "tootherd_corrupt_records_total",
        "Total number of unreadable records skipped during cache queries"
    ).expect("metric can be created");
    pub static ref SEEN_SET_SIZE: IntGauge = IntGauge::new(
        "tootherd_seen_set_size",
        "Current number of toot IDs in the in-process seen set"
    ).expect("metric can be created");

    // Store Metrics
    pub static ref STORE_WRITE_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "tootherd_store_write_errors_total",
        "Total number of failed record store writes"
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(RECONCILE_PASSES_TOTAL.clone()))
        .expect("RECONCILE_PASSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FOLLOWS_TOTAL.clone()))
        .expect("FOLLOWS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(LIST_ADDS_TOTAL.clone()))
        .expect("LIST_ADDS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HANDLES_NOT_FOUND_TOTAL.clone()))
        .expect("HANDLES_NOT_FOUND_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HANDLES_FAILED_TOTAL.clone()))
        .expect("HANDLES_FAILED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(RATE_LIMIT_HITS_TOTAL.clone()))
        .expect("RATE_LIMIT_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(TOOTS_INGESTED_TOTAL.clone()))
        .expect("TOOTS_INGESTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(BOOSTS_SKIPPED_TOTAL.clone()))
        .expect("BOOSTS_SKIPPED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CORRUPT_RECORDS_TOTAL.clone()))
        .expect("CORRUPT_RECORDS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SEEN_SET_SIZE.clone()))
        .expect("SEEN_SET_SIZE can be registered");
    REGISTRY
        .register(Box::new(STORE_WRITE_ERRORS_TOTAL.clone()))
        .expect("STORE_WRITE_ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
