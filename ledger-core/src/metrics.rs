//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_deposits_settled_total` - Deposits credited via gateway callback
//! - `ledger_withdrawals_settled_total` - Withdrawals debited via gateway callback
//! - `ledger_callbacks_duplicate_total` - Callbacks ignored by the terminal-state check
//! - `ledger_guard_failures_total` - Mutations rejected by a balance or state guard
//! - `ledger_locks_created_total` - Locked savings created
//! - `ledger_locks_unlocked_total` - Locked savings unlocked (mature or early)
//! - `ledger_mutation_duration_seconds` - Histogram of mutation latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Each instance carries its own registry so independent ledgers
/// (and parallel tests) never collide on metric names.
#[derive(Clone)]
pub struct Metrics {
    /// Deposits settled
    pub deposits_settled: IntCounter,

    /// Withdrawals settled
    pub withdrawals_settled: IntCounter,

    /// Duplicate callback deliveries ignored
    pub callbacks_duplicate: IntCounter,

    /// Guard failures (insufficient funds, already unlocked, ...)
    pub guard_failures: IntCounter,

    /// Locks created
    pub locks_created: IntCounter,

    /// Locks unlocked
    pub locks_unlocked: IntCounter,

    /// Mutation duration histogram
    pub mutation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let deposits_settled = IntCounter::with_opts(Opts::new(
            "ledger_deposits_settled_total",
            "Deposits credited via gateway callback",
        ))?;
        registry.register(Box::new(deposits_settled.clone()))?;

        let withdrawals_settled = IntCounter::with_opts(Opts::new(
            "ledger_withdrawals_settled_total",
            "Withdrawals debited via gateway callback",
        ))?;
        registry.register(Box::new(withdrawals_settled.clone()))?;

        let callbacks_duplicate = IntCounter::with_opts(Opts::new(
            "ledger_callbacks_duplicate_total",
            "Callbacks ignored by the terminal-state check",
        ))?;
        registry.register(Box::new(callbacks_duplicate.clone()))?;

        let guard_failures = IntCounter::with_opts(Opts::new(
            "ledger_guard_failures_total",
            "Mutations rejected by a balance or state guard",
        ))?;
        registry.register(Box::new(guard_failures.clone()))?;

        let locks_created = IntCounter::with_opts(Opts::new(
            "ledger_locks_created_total",
            "Locked savings created",
        ))?;
        registry.register(Box::new(locks_created.clone()))?;

        let locks_unlocked = IntCounter::with_opts(Opts::new(
            "ledger_locks_unlocked_total",
            "Locked savings unlocked (mature or early)",
        ))?;
        registry.register(Box::new(locks_unlocked.clone()))?;

        let mutation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_mutation_duration_seconds",
                "Histogram of mutation latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(mutation_duration.clone()))?;

        Ok(Self {
            deposits_settled,
            withdrawals_settled,
            callbacks_duplicate,
            guard_failures,
            locks_created,
            locks_unlocked,
            mutation_duration,
            registry,
        })
    }

    /// Record a settled deposit
    pub fn record_deposit_settled(&self) {
        self.deposits_settled.inc();
    }

    /// Record a settled withdrawal
    pub fn record_withdrawal_settled(&self) {
        self.withdrawals_settled.inc();
    }

    /// Record a duplicate callback delivery
    pub fn record_duplicate_callback(&self) {
        self.callbacks_duplicate.inc();
    }

    /// Record a guard failure
    pub fn record_guard_failure(&self) {
        self.guard_failures.inc();
    }

    /// Record a created lock
    pub fn record_lock_created(&self) {
        self.locks_created.inc();
    }

    /// Record an unlocked lock
    pub fn record_lock_unlocked(&self) {
        self.locks_unlocked.inc();
    }

    /// Record mutation duration
    pub fn record_mutation_duration(&self, duration_seconds: f64) {
        self.mutation_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
