// src/analysis/gate.rs

use std::sync::atomic::{AtomicBool, Ordering};

/// One analysis at a time. A second caller is turned away rather than queued.
#[derive(Debug, Default)]
pub struct AnalysisGate {
    busy: AtomicBool,
}

/// Holds the gate closed; reopens it on drop, including when the owning
/// future is cancelled mid-request.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a AnalysisGate,
}

impl AnalysisGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_enter(&self) -> Option<GateGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}
