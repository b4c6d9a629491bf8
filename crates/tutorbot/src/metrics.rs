
use prometheus::{Encoder, TextEncoder, Registry, IntCounterVec, IntCounter, Histogram};
use lazy_static::lazy_static;
use std::sync::OnceLock;
use axum::response::IntoResponse;
use axum::http::StatusCode;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static TURN_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static DEGRADED_COMPOSITIONS: OnceLock<IntCounter> = OnceLock::new();
static UPDATES_DROPPED: OnceLock<IntCounter> = OnceLock::new();
static CONTEXT_TOKENS: OnceLock<Histogram> = OnceLock::new();

pub fn init_metrics() {
    let req_counter = REQ_COUNTER.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"]
        ).unwrap()
    });

    let turn_counter = TURN_COUNTER.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("chat_turns_total", "Chat turns by outcome"),
            &["outcome"]
        ).unwrap()
    });

    let degraded = DEGRADED_COMPOSITIONS.get_or_init(|| {
        IntCounter::new(
            "degraded_compositions_total",
            "Compositions that fell back to recency-only context"
        ).unwrap()
    });

    let dropped = UPDATES_DROPPED.get_or_init(|| {
        IntCounter::new(
            "background_updates_dropped_total",
            "Post-turn summary/index updates dropped after retry"
        ).unwrap()
    });

    let context_tokens = CONTEXT_TOKENS.get_or_init(|| {
        Histogram::with_opts(prometheus::HistogramOpts::new(
            "context_tokens",
            "Estimated token cost of composed context bundles"
        )).unwrap()
    });

    REGISTRY.register(Box::new(req_counter.clone())).ok();
    REGISTRY.register(Box::new(turn_counter.clone())).ok();
    REGISTRY.register(Box::new(degraded.clone())).ok();
    REGISTRY.register(Box::new(dropped.clone())).ok();
    REGISTRY.register(Box::new(context_tokens.clone())).ok();
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_turn(outcome: &str) {
    if let Some(counter) = TURN_COUNTER.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn inc_degraded_composition() {
    if let Some(counter) = DEGRADED_COMPOSITIONS.get() {
        counter.inc();
    }
}

pub fn inc_update_dropped() {
    if let Some(counter) = UPDATES_DROPPED.get() {
        counter.inc();
    }
}

pub fn observe_context_tokens(tokens: f64) {
    if let Some(histogram) = CONTEXT_TOKENS.get() {
        histogram.observe(tokens);
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
