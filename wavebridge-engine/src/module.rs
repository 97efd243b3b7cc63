//! Computation modules: the pluggable units that synthesize samples.
//!
//! This module defines the [`ComputationModule`] trait the render bridge
//! drives, and [`Oscillator`], the built-in module family produced by the
//! manifest loader.
//!
//! Design goals
//! - No dynamic allocations inside `generate`
//! - Configuration entry points are plain setters; the bridge only calls them
//!   between quanta, on the render thread
//! - Object-safe, so modules can be swapped behind a `Box<dyn _>`

use wavebridge_core::waveform::{shape, NoiseSource, PhaseAccumulator, Waveform};

/// A sample-generating unit owned by the render bridge.
pub trait ComputationModule: Send + 'static {
    /// Called once in the control context before the module is published,
    /// and again if the host sample rate changes.
    fn prepare(&mut self, sample_rate: f32);

    fn set_frequency(&mut self, hz: f32);

    /// Read-time phase offset, radians.
    fn set_phase_offset(&mut self, radians: f32);

    /// Hard-set the running phase, radians.
    fn reset_phase(&mut self, radians: f32);

    /// Fill `out` and return how many samples were actually written.
    /// Anything short of `out.len()` is zero-filled by the bridge.
    fn generate(&mut self, out: &mut [f32]) -> usize;

    /// Name for log lines.
    fn name(&self) -> &str {
        "module"
    }
}

/// Single-voice oscillator module.
#[derive(Clone, Debug)]
pub struct Oscillator {
    name: String,
    wave: Waveform,
    acc: PhaseAccumulator,
    amplitude: f32,
    noise: NoiseSource,
}

impl Oscillator {
    pub fn new(name: impl Into<String>, wave: Waveform, freq_hz: f32, sample_rate: f32) -> Self {
        Self {
            name: name.into(),
            wave,
            acc: PhaseAccumulator::new(freq_hz, sample_rate),
            amplitude: 1.0,
            noise: NoiseSource::new(0),
        }
    }

    /// 440 Hz sine, zero offset.
    pub fn sine(sample_rate: f32) -> Self {
        Self::new("sine-oscillator", Waveform::Sine, 440.0, sample_rate)
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    pub fn with_phase_offset(mut self, radians: f32) -> Self {
        self.acc.set_offset(radians);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.noise = NoiseSource::new(seed);
        self
    }

    #[inline] pub fn waveform(&self) -> Waveform { self.wave }
    #[inline] pub fn frequency(&self) -> f32 { self.acc.freq() }
    #[inline] pub fn phase_offset(&self) -> f32 { self.acc.offset() }
}

impl ComputationModule for Oscillator {
    fn prepare(&mut self, sample_rate: f32) {
        self.acc.set_sample_rate(sample_rate);
    }

    fn set_frequency(&mut self, hz: f32) {
        self.acc.set_freq(hz);
    }

    fn set_phase_offset(&mut self, radians: f32) {
        self.acc.set_offset(radians);
    }

    fn reset_phase(&mut self, radians: f32) {
        self.acc.reset(radians);
    }

    fn generate(&mut self, out: &mut [f32]) -> usize {
        match self.wave {
            Waveform::Noise => {
                for s in out.iter_mut() {
                    *s = self.noise.next() * self.amplitude;
                }
            }
            wave => {
                for s in out.iter_mut() {
                    *s = shape(wave, self.acc.tick()) * self.amplitude;
                }
            }
        }
        out.len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_whole_block() {
        let mut osc = Oscillator::sine(48_000.0);
        let mut buf = [9.0f32; 128];
        assert_eq!(osc.generate(&mut buf), 128);
        assert!(buf.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(buf[0].abs() < 1e-6);
    }

    #[test]
    fn blocks_are_phase_continuous() {
        let mut a = Oscillator::sine(48_000.0);
        let mut b = Oscillator::sine(48_000.0);
        let mut whole = [0.0f32; 256];
        a.generate(&mut whole);
        let mut first = [0.0f32; 128];
        let mut second = [0.0f32; 128];
        b.generate(&mut first);
        b.generate(&mut second);
        assert_eq!(&whole[..128], &first[..]);
        for (x, y) in whole[128..].iter().zip(second.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn reset_phase_restarts_the_cycle() {
        let mut osc = Oscillator::sine(48_000.0);
        let mut buf = [0.0f32; 77];
        osc.generate(&mut buf);
        osc.reset_phase(0.0);
        let mut one = [0.0f32; 1];
        osc.generate(&mut one);
        assert!(one[0].abs() < 1e-6);
    }

    #[test]
    fn amplitude_scales_output() {
        let mut osc = Oscillator::new("sq", Waveform::Square, 100.0, 48_000.0).with_amplitude(0.25);
        let mut buf = [0.0f32; 64];
        osc.generate(&mut buf);
        assert!(buf.iter().all(|s| s.abs() == 0.25));
    }
}
