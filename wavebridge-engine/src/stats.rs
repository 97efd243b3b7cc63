//! Out-of-band render counters.
//!
//! Written only by the render thread (relaxed stores, except `ready` which
//! is published with release ordering), read by the control context for
//! logging and tests.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RenderStats {
    ready: AtomicBool,
    generation: AtomicU64,
    quanta: AtomicU64,
    silent_quanta: AtomicU64,
    overruns: AtomicU64,
    faults: AtomicU64,
    dropped_parameters: AtomicU64,
    stale_installs: AtomicU64,
    scratch_leases: AtomicU64,
    scratch_releases: AtomicU64,
    peak_bits: AtomicU32,
}

/// Plain copy of the counters at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub ready: bool,
    pub generation: u64,
    pub quanta: u64,
    pub silent_quanta: u64,
    pub overruns: u64,
    pub faults: u64,
    pub dropped_parameters: u64,
    pub stale_installs: u64,
    pub scratch_leases: u64,
    pub scratch_releases: u64,
    pub peak: f32,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline] pub fn is_ready(&self) -> bool { self.ready.load(Ordering::Acquire) }
    #[inline] pub fn generation(&self) -> u64 { self.generation.load(Ordering::Acquire) }

    #[inline]
    pub(crate) fn publish_ready(&self, ready: bool, generation: u64) {
        self.generation.store(generation, Ordering::Relaxed);
        self.ready.store(ready, Ordering::Release);
    }

    #[inline] pub(crate) fn count_quantum(&self) { self.quanta.fetch_add(1, Ordering::Relaxed); }
    #[inline] pub(crate) fn count_silent(&self) { self.silent_quanta.fetch_add(1, Ordering::Relaxed); }
    #[inline] pub(crate) fn count_overrun(&self) { self.overruns.fetch_add(1, Ordering::Relaxed); }
    #[inline] pub(crate) fn count_fault(&self) { self.faults.fetch_add(1, Ordering::Relaxed); }
    #[inline] pub(crate) fn count_dropped_parameter(&self) { self.dropped_parameters.fetch_add(1, Ordering::Relaxed); }
    #[inline] pub(crate) fn count_stale_install(&self) { self.stale_installs.fetch_add(1, Ordering::Relaxed); }
    #[inline] pub(crate) fn count_lease(&self) { self.scratch_leases.fetch_add(1, Ordering::Relaxed); }
    #[inline] pub(crate) fn count_release(&self) { self.scratch_releases.fetch_add(1, Ordering::Relaxed); }

    /// Track the running peak; reset by [`take_peak`](Self::take_peak).
    #[inline]
    pub(crate) fn note_peak(&self, block: &[f32]) {
        let peak = block.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let prev = f32::from_bits(self.peak_bits.load(Ordering::Relaxed));
        if peak > prev {
            self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
        }
    }

    /// Read and clear the peak since the last call (control side meter).
    pub fn take_peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.swap(0, Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ready: self.is_ready(),
            generation: self.generation(),
            quanta: self.quanta.load(Ordering::Relaxed),
            silent_quanta: self.silent_quanta.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            dropped_parameters: self.dropped_parameters.load(Ordering::Relaxed),
            stale_installs: self.stale_installs.load(Ordering::Relaxed),
            scratch_leases: self.scratch_leases.load(Ordering::Relaxed),
            scratch_releases: self.scratch_releases.load(Ordering::Relaxed),
            peak: f32::from_bits(self.peak_bits.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_holds_the_max_until_taken() {
        let stats = RenderStats::new();
        stats.note_peak(&[0.25, -0.75, 0.5]);
        stats.note_peak(&[0.1, -0.2]);
        assert_eq!(stats.snapshot().peak, 0.75);
        assert_eq!(stats.take_peak(), 0.75);
        assert_eq!(stats.take_peak(), 0.0);
        stats.note_peak(&[-1.0]);
        assert_eq!(stats.snapshot().peak, 1.0);
    }
}
