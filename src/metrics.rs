//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::Once;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Session lifecycle
    pub static ref LOGINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("oauthgate_logins_total", "Completed login attempts by outcome"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref LOGOUTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("oauthgate_logouts_total", "Logouts by result of the store-side delete"),
        &["store_delete"]
    ).expect("metric can be created");
    pub static ref SESSION_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("oauthgate_session_lookups_total", "Per-request session lookups by result"),
        &["result"]
    ).expect("metric can be created");

    // Backing stores
    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("oauthgate_store_errors_total", "Failed calls to a backing store"),
        &["store"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("oauthgate_errors_total", "Total number of error responses"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; registration happens on the first call.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(LOGINS_TOTAL.clone()))
            .expect("LOGINS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(LOGOUTS_TOTAL.clone()))
            .expect("LOGOUTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SESSION_LOOKUPS_TOTAL.clone()))
            .expect("SESSION_LOOKUPS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(STORE_ERRORS_TOTAL.clone()))
            .expect("STORE_ERRORS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}
