//! Process-wide concurrency limiter for heavy models (spec.md §4.2).
//!
//! Heavy models cannot run concurrently on a single host without thrashing;
//! non-heavy models run unconstrained. Acquisition is scoped: the guard
//! returned from [`HeavyGate::acquire`] releases the permit on every exit
//! path, including cancellation, the same discipline the teacher's
//! `speculative.rs` uses around `abort_handle()` captured before
//! `tokio::select!`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::is_heavy;

#[derive(Debug, Clone, Copy)]
pub struct GateMetrics {
    pub in_use: usize,
    pub waiters: usize,
}

pub struct HeavyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    waiters: Arc<AtomicUsize>,
    heavy_hints: Vec<String>,
}

impl HeavyGate {
    pub fn new(capacity: usize, heavy_hints: Vec<String>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            waiters: Arc::new(AtomicUsize::new(0)),
            heavy_hints,
        }
    }

    pub fn is_heavy(&self, model_id: &str) -> bool {
        is_heavy(model_id, &self.heavy_hints)
    }

    /// Scoped acquisition: a no-op guard for non-heavy models, a real
    /// semaphore permit (blocking if saturated) for heavy ones. Records the
    /// wait-time histogram the ambient metrics stack exposes at
    /// `GET /metrics` (SPEC_FULL.md §2).
    pub async fn acquire(&self, model_id: &str) -> HeavyGuard<'_> {
        if !self.is_heavy(model_id) {
            return HeavyGuard { permit: None };
        }
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let wait_start = std::time::Instant::now();
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("heavy gate semaphore is never closed");
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        metrics::histogram!("orchestrator_heavy_gate_wait_seconds").record(wait_start.elapsed().as_secs_f64());
        HeavyGuard { permit: Some(permit) }
    }

    pub fn metrics(&self) -> GateMetrics {
        let available = self.semaphore.available_permits();
        GateMetrics {
            in_use: self.capacity.saturating_sub(available),
            waiters: self.waiters.load(Ordering::SeqCst),
        }
    }
}

/// RAII guard released on drop (covers cancellation: an aborted task drops
/// its guard as part of unwinding). `SemaphorePermit`'s own `Drop` impl does
/// the actual release; this wrapper is the single type callers hold.
pub struct HeavyGuard<'a> {
    permit: Option<SemaphorePermit<'a>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn hints() -> Vec<String> {
        vec!["32b".to_string(), "mixtral-8x7b".to_string()]
    }

    #[tokio::test]
    async fn non_heavy_models_never_block() {
        let gate = HeavyGate::new(1, hints());
        let g1 = gate.acquire("llama3.2:3b").await;
        let g2 = gate.acquire("llama3.2:3b").await;
        drop(g1);
        drop(g2);
        assert_eq!(gate.metrics().in_use, 0);
    }

    #[tokio::test]
    async fn heavy_models_serialize_on_capacity_one() {
        let gate = Arc::new(HeavyGate::new(1, hints()));
        let g1 = gate.acquire("qwen32b-instruct").await;
        assert_eq!(gate.metrics().in_use, 1);

        let gate2 = gate.clone();
        let handle = tokio::spawn(async move {
            let _g2 = gate2.acquire("qwen32b-instruct").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.metrics().in_use, 1, "second heavy acquire should be waiting");

        drop(g1);
        handle.await.unwrap();
    }
}
