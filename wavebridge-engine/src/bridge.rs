//! Render bridge: owns the computation module on the render thread.
//!
//! IMPORTANT: everything reachable from [`RenderBridge::render`] and
//! [`RenderBridge::drain_commands`] runs on the render thread. No logging, no
//! locks, no heap work, no `Result`s. Problems degrade to silence and show up
//! in [`RenderStats`].
//!
//! Readiness is simply "a module is installed". The render thread is the only
//! writer of the module slot; it swaps modules between quanta, so a render
//! call always sees one fully constructed instance or none.

use crate::channel::{Parameter, RenderCommand, RenderReceiver};
use crate::config::QUANTUM;
use crate::loader::LoadedModule;
use crate::stats::RenderStats;
use basedrop::Owned;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use wavebridge_core::dsp::sanitize_block;

/// Pre-allocated scratch for one quantum. Every lease is released when the
/// guard drops, on every exit path.
pub struct ScratchPool {
    buf: Box<[f32]>,
    outstanding: usize,
    stats: Arc<RenderStats>,
}

impl ScratchPool {
    pub fn new(capacity: usize, stats: Arc<RenderStats>) -> Self {
        Self { buf: vec![0.0; capacity.max(1)].into_boxed_slice(), outstanding: 0, stats }
    }

    /// Lease a zeroed window of `len` samples (clamped to capacity).
    #[inline]
    pub fn lease(&mut self, len: usize) -> ScratchLease<'_> {
        let len = len.min(self.buf.len());
        self.buf[..len].fill(0.0);
        self.outstanding += 1;
        self.stats.count_lease();
        ScratchLease { pool: self, len }
    }

    #[inline] pub fn outstanding(&self) -> usize { self.outstanding }
    #[inline] pub fn capacity(&self) -> usize { self.buf.len() }
}

pub struct ScratchLease<'a> {
    pool: &'a mut ScratchPool,
    len: usize,
}

impl Deref for ScratchLease<'_> {
    type Target = [f32];
    fn deref(&self) -> &[f32] {
        &self.pool.buf[..self.len]
    }
}

impl DerefMut for ScratchLease<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.pool.buf[..self.len]
    }
}

impl Drop for ScratchLease<'_> {
    fn drop(&mut self) {
        self.pool.outstanding -= 1;
        self.pool.stats.count_release();
    }
}

pub struct RenderBridge {
    module: Option<Owned<LoadedModule>>,
    generation: u64,
    sample_rate: f32,
    commands: RenderReceiver,
    scratch: ScratchPool,
    stats: Arc<RenderStats>,
}

impl RenderBridge {
    pub fn new(sample_rate: f32, commands: RenderReceiver, stats: Arc<RenderStats>) -> Self {
        Self {
            module: None,
            generation: 0,
            sample_rate,
            commands,
            scratch: ScratchPool::new(QUANTUM, stats.clone()),
            stats,
        }
    }

    #[inline] pub fn is_ready(&self) -> bool { self.module.is_some() }
    #[inline] pub fn generation(&self) -> u64 { self.generation }
    #[inline] pub fn sample_rate(&self) -> f32 { self.sample_rate }
    #[inline] pub fn stats(&self) -> &Arc<RenderStats> { &self.stats }
    #[inline] pub fn scratch_outstanding(&self) -> usize { self.scratch.outstanding() }

    /// Apply every pending control command. Call between quanta only.
    pub fn drain_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Some(command) = self.commands.pop() {
            self.apply(command);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::Install { generation, module } => self.install(generation, module),
            RenderCommand::SetParameter { param, value } => self.set_parameter(param, value),
            RenderCommand::ResetPhase { phase } => self.reset_phase(phase),
        }
    }

    fn install(&mut self, generation: u64, mut module: Owned<LoadedModule>) {
        if generation <= self.generation {
            // dropping here only enqueues for the gc thread
            self.stats.count_stale_install();
            return;
        }
        module.prepare(self.sample_rate);
        let retired = self.module.replace(module);
        self.generation = generation;
        self.stats.publish_ready(true, generation);
        drop(retired);
    }

    /// Forward to the module if one is installed; otherwise drop and count.
    pub fn set_parameter(&mut self, param: Parameter, value: f32) {
        let Some(module) = self.module.as_mut() else {
            self.stats.count_dropped_parameter();
            return;
        };
        match param {
            Parameter::Frequency => module.set_frequency(value),
            Parameter::Phase => module.set_phase_offset(value),
        }
    }

    pub fn reset_phase(&mut self, phase: f32) {
        match self.module.as_mut() {
            Some(module) => module.reset_phase(phase),
            None => self.stats.count_dropped_parameter(),
        }
    }

    /// Host sample rate changed.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        if let Some(module) = self.module.as_mut() {
            module.prepare(sample_rate);
        }
    }

    /// Write exactly `out.len()` samples. Never blocks, never fails.
    pub fn render(&mut self, out: &mut [f32]) {
        self.stats.count_quantum();
        let Some(module) = self.module.as_mut() else {
            out.fill(0.0);
            self.stats.count_silent();
            return;
        };

        let mut faulted = false;
        for chunk in out.chunks_mut(QUANTUM) {
            let mut lease = self.scratch.lease(chunk.len());
            if !faulted {
                let wanted = lease.len();
                match panic::catch_unwind(AssertUnwindSafe(|| module.generate(&mut lease))) {
                    Ok(written) if written >= wanted => {}
                    Ok(written) => {
                        lease[written..].fill(0.0);
                        self.stats.count_overrun();
                    }
                    Err(_) => {
                        lease.fill(0.0);
                        faulted = true;
                        self.stats.count_fault();
                    }
                }
            }
            sanitize_block(&mut lease);
            chunk.copy_from_slice(&lease);
        }

        if faulted {
            // a module that panicked mid-block is not trusted again
            self.module = None;
            self.stats.publish_ready(false, self.generation);
        }
        self.stats.note_peak(out);
    }
}
