//! Hosts that pull quanta out of a [`WorkletProcessor`].
//!
//! Audio devices ask for buffers of whatever size they like; the processor
//! only ever renders whole 128-sample quanta. [`QuantumAdapter`] sits between
//! the two. It is safe to call from a device callback: one fixed block, no
//! allocation, no locks.

use crate::config::QUANTUM;
use crate::runtime::WorkletProcessor;

pub struct QuantumAdapter {
    processor: WorkletProcessor,
    block: [f32; QUANTUM],
    pos: usize,
}

impl QuantumAdapter {
    pub fn new(processor: WorkletProcessor) -> Self {
        Self { processor, block: [0.0; QUANTUM], pos: QUANTUM }
    }

    #[inline] pub fn processor(&self) -> &WorkletProcessor { &self.processor }
    #[inline] pub fn processor_mut(&mut self) -> &mut WorkletProcessor { &mut self.processor }

    pub fn into_processor(self) -> WorkletProcessor {
        self.processor
    }

    /// Follow a host sample-rate change. Takes effect from the next quantum.
    #[inline]
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate != self.processor.bridge().sample_rate() {
            self.processor.bridge_mut().set_sample_rate(sample_rate);
        }
    }

    /// Next mono sample, rendering a fresh quantum when the last one is used up.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        if self.pos == QUANTUM {
            self.processor.render_mono(&mut self.block);
            self.pos = 0;
        }
        let s = self.block[self.pos];
        self.pos += 1;
        s
    }

    /// Fill a mono buffer of any length.
    pub fn fill_mono(&mut self, out: &mut [f32]) {
        for s in out.iter_mut() {
            *s = self.next_sample();
        }
    }

    /// Fill an interleaved buffer, same signal on every channel.
    pub fn fill_interleaved(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels.max(1)) {
            let s = self.next_sample();
            frame.fill(s);
        }
    }

    /// Samples already rendered but not yet handed to the device.
    #[inline]
    pub fn buffered(&self) -> usize {
        QUANTUM - self.pos
    }
}

/// Renders without a device, as fast as the processor allows.
pub struct OfflineHost {
    adapter: QuantumAdapter,
}

impl OfflineHost {
    pub fn new(processor: WorkletProcessor) -> Self {
        Self { adapter: QuantumAdapter::new(processor) }
    }

    pub fn processor_mut(&mut self) -> &mut WorkletProcessor {
        self.adapter.processor_mut()
    }

    /// Render `frames` mono samples.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.adapter.fill_mono(&mut out);
        out
    }

    /// Render whole quanta; the first sample is quantum-aligned only if
    /// nothing is buffered.
    pub fn render_quanta(&mut self, quanta: usize) -> Vec<f32> {
        self.render(quanta * QUANTUM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::RenderBridge;
    use crate::channel::{control_channel, RenderCommand};
    use crate::gc::gc_handle;
    use crate::module::Oscillator;
    use crate::stats::RenderStats;
    use basedrop::Owned;
    use std::sync::Arc;

    fn processor() -> (crate::channel::ControlSender, Arc<RenderStats>, WorkletProcessor) {
        let (tx, rx) = control_channel(8);
        let stats = Arc::new(RenderStats::new());
        let bridge = RenderBridge::new(48_000.0, rx, stats.clone());
        (tx, stats, WorkletProcessor::new(bridge))
    }

    #[test]
    fn odd_device_buffers_only_pull_whole_quanta() {
        let (_tx, stats, p) = processor();
        let mut a = QuantumAdapter::new(p);
        let mut buf = [1.0f32; 100];
        a.fill_mono(&mut buf);
        assert_eq!(stats.snapshot().quanta, 1);
        assert_eq!(a.buffered(), 28);
        a.fill_mono(&mut buf);
        assert_eq!(stats.snapshot().quanta, 2);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn interleaved_frames_share_a_sample() {
        let (tx, _stats, p) = processor();
        let module: crate::loader::LoadedModule = Box::new(Oscillator::sine(48_000.0));
        tx.send(RenderCommand::Install { generation: 1, module: Owned::new(&gc_handle(), module) }).unwrap();
        let mut a = QuantumAdapter::new(p);
        let mut data = [0.0f32; 64];
        a.fill_interleaved(&mut data, 2);
        for frame in data.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert!(data.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn offline_render_has_requested_length() {
        let (_tx, stats, p) = processor();
        let mut host = OfflineHost::new(p);
        assert_eq!(host.render_quanta(4).len(), 512);
        assert_eq!(stats.snapshot().silent_quanta, 4);
    }
}
