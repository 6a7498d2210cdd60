//! Per-identity admission state: a concurrency gate and a rate limiter.
//!
//! Both live in an [`IdentityRegistry`], a bounded map that creates state on
//! first use and evicts the least recently used idle entries once it grows
//! past its capacity. An entry is idle when nothing outside the registry
//! holds its `Arc`, so a lock owned by an in-flight request is never evicted.

use dashmap::{mapref::entry::Entry, DashMap};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use service_core::error::AppError;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::AdmissionConfig;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("too many requests")]
    GateTimeout,

    #[error("too many requests")]
    RateLimited { retry_after: Duration },
}

impl AdmissionError {
    fn stage(&self) -> &'static str {
        match self {
            AdmissionError::GateTimeout => "concurrency_gate",
            AdmissionError::RateLimited { .. } => "rate_limit",
        }
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        let retry_after = match &err {
            AdmissionError::GateTimeout => None,
            AdmissionError::RateLimited { retry_after } => Some(whole_seconds(*retry_after)),
        };
        AppError::TooManyRequests(err.to_string(), retry_after)
    }
}

/// Rounds up, never below one second.
fn whole_seconds(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

// ==================== Registry ====================

struct Slot<T> {
    value: Arc<T>,
    last_used: AtomicU64,
}

pub struct IdentityRegistry<T> {
    entries: DashMap<Uuid, Slot<T>>,
    clock: AtomicU64,
    capacity: usize,
}

impl<T> IdentityRegistry<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    pub fn get_or_insert_with(&self, id: Uuid, init: impl FnOnce() -> T) -> Arc<T> {
        let now = self.clock.fetch_add(1, Ordering::Relaxed);

        let (value, inserted) = match self.entries.entry(id) {
            Entry::Occupied(entry) => {
                let slot = entry.get();
                slot.last_used.store(now, Ordering::Relaxed);
                (Arc::clone(&slot.value), false)
            }
            Entry::Vacant(entry) => {
                let value = Arc::new(init());
                entry.insert(Slot {
                    value: Arc::clone(&value),
                    last_used: AtomicU64::new(now),
                });
                (value, true)
            }
        };

        if inserted && self.entries.len() > self.capacity {
            self.evict_idle();
        }

        value
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops idle entries, oldest first, until the map is back under
    /// roughly nine tenths of capacity. Entries in use are skipped, so the
    /// map may stay above capacity while every identity is busy.
    fn evict_idle(&self) {
        let target = self.capacity - self.capacity / 10;
        let excess = self.entries.len().saturating_sub(target);
        if excess == 0 {
            return;
        }

        let mut idle: Vec<(Uuid, u64)> = self
            .entries
            .iter()
            .filter(|entry| Arc::strong_count(&entry.value) == 1)
            .map(|entry| (*entry.key(), entry.last_used.load(Ordering::Relaxed)))
            .collect();
        idle.sort_unstable_by_key(|(_, last_used)| *last_used);

        let mut evicted = 0usize;
        for (id, _) in idle.into_iter().take(excess) {
            if self
                .entries
                .remove_if(&id, |_, slot| Arc::strong_count(&slot.value) == 1)
                .is_some()
            {
                evicted += 1;
            }
        }

        tracing::debug!(evicted, remaining = self.entries.len(), "Evicted idle admission state");
    }
}

// ==================== Concurrency gate ====================

/// Held for the lifetime of an admitted request.
pub struct GatePermit {
    _guard: OwnedMutexGuard<()>,
}

pub struct ConcurrencyGate {
    locks: IdentityRegistry<Mutex<()>>,
    timeout: Duration,
}

impl ConcurrencyGate {
    pub fn new(timeout: Duration, capacity: usize) -> Self {
        Self {
            locks: IdentityRegistry::new(capacity),
            timeout,
        }
    }

    /// Waits up to the configured timeout for the identity's slot.
    pub async fn acquire(&self, identity: Uuid) -> Result<GatePermit, AdmissionError> {
        let lock = self.locks.get_or_insert_with(identity, || Mutex::new(()));

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(GatePermit { _guard: guard }),
            Err(_) => Err(AdmissionError::GateTimeout),
        }
    }
}

// ==================== Rate limiter ====================

pub struct IdentityRateLimiter {
    limiters: IdentityRegistry<DirectRateLimiter>,
    quota: Quota,
}

impl IdentityRateLimiter {
    pub fn new(quota: Quota, capacity: usize) -> Self {
        Self {
            limiters: IdentityRegistry::new(capacity),
            quota,
        }
    }

    /// Takes one unit from the identity's bucket.
    pub fn check(&self, identity: Uuid) -> Result<(), AdmissionError> {
        let quota = self.quota;
        let limiter = self
            .limiters
            .get_or_insert_with(identity, || RateLimiter::direct(quota));

        limiter.check().map_err(|negative| AdmissionError::RateLimited {
            retry_after: negative.wait_time_from(DefaultClock::default().now()),
        })
    }
}

// ==================== Admission ====================

/// Process-wide admission state, built once at startup and shared by the
/// request pipeline.
#[derive(Clone)]
pub struct Admission {
    gate: Arc<ConcurrencyGate>,
    limiter: Arc<IdentityRateLimiter>,
}

impl Admission {
    pub fn new(config: &AdmissionConfig) -> Result<Self, anyhow::Error> {
        let per_second = NonZeroU32::new(config.rate_per_second)
            .ok_or_else(|| anyhow::anyhow!("admission rate must be positive"))?;
        let burst = NonZeroU32::new(config.rate_burst)
            .ok_or_else(|| anyhow::anyhow!("admission burst must be positive"))?;
        if config.gate_timeout_ms == 0 {
            anyhow::bail!("admission gate timeout must be positive");
        }

        let quota = Quota::per_second(per_second).allow_burst(burst);

        Ok(Self {
            gate: Arc::new(ConcurrencyGate::new(
                Duration::from_millis(config.gate_timeout_ms),
                config.registry_capacity,
            )),
            limiter: Arc::new(IdentityRateLimiter::new(quota, config.registry_capacity)),
        })
    }

    pub async fn enter(&self, identity: Uuid) -> Result<GatePermit, AdmissionError> {
        self.gate.acquire(identity).await.inspect_err(record_rejection)
    }

    pub fn check_rate(&self, identity: Uuid) -> Result<(), AdmissionError> {
        self.limiter.check(identity).inspect_err(record_rejection)
    }
}

fn record_rejection(err: &AdmissionError) {
    metrics::counter!("admission_rejections_total", "stage" => err.stage()).increment(1);
    tracing::warn!(stage = err.stage(), "Request rejected by admission");
}
