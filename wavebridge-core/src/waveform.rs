//! Waveform shapes and the phase accumulator that drives them.
//!
//! The accumulator keeps phase in **radians** in [0, 2π). Each sample is
//! `shape(phase + offset)`, then the phase advances by `2π f / sr`. The
//! phase offset is a read-time offset and never accumulates, so changing it
//! shifts the waveform without disturbing the running phase.

use crate::dsp::{fast_sin, wrap_phase_tau, TAU};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Oscillator waveform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Saw,
    Triangle,
    Noise,
}

impl Waveform {
    /// Parse the lowercase name used in module manifests.
    pub fn from_name(name: &str) -> Option<Self> {
        const NAMES: [(&str, Waveform); 9] = [
            ("sine", Waveform::Sine),
            ("sin", Waveform::Sine),
            ("square", Waveform::Square),
            ("sqr", Waveform::Square),
            ("saw", Waveform::Saw),
            ("sawtooth", Waveform::Saw),
            ("triangle", Waveform::Triangle),
            ("tri", Waveform::Triangle),
            ("noise", Waveform::Noise),
        ];
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, w)| w)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Square => "square",
            Self::Saw => "saw",
            Self::Triangle => "triangle",
            Self::Noise => "noise",
        }
    }
}

/// Deterministic periodic shape at `phase` radians (wrapped internally).
/// `Noise` has no periodic shape and returns 0 here.
#[inline]
pub fn shape(wave: Waveform, phase: f32) -> f32 {
    let p = wrap_phase_tau(phase);
    let p01 = p / TAU;
    match wave {
        Waveform::Sine => fast_sin(p),
        Waveform::Square => if p01 < 0.5 { 1.0 } else { -1.0 },
        Waveform::Saw => 2.0 * p01 - 1.0,
        Waveform::Triangle => 1.0 - 4.0 * (p01 - 0.5).abs(),
        Waveform::Noise => 0.0,
    }
}

/// Running phase with frequency and read-time offset.
#[derive(Copy, Clone, Debug)]
pub struct PhaseAccumulator {
    phase: f32,  // radians, [0, 2π)
    offset: f32, // radians
    freq: f32,   // Hz
    sr: f32,
}

impl PhaseAccumulator {
    #[inline]
    pub fn new(freq_hz: f32, sr: f32) -> Self {
        Self { phase: 0.0, offset: 0.0, freq: freq_hz.max(0.0), sr: sr.max(1.0) }
    }

    #[inline] pub fn set_sample_rate(&mut self, sr: f32) { self.sr = sr.max(1.0); }
    #[inline] pub fn set_freq(&mut self, hz: f32) { if hz.is_finite() { self.freq = hz.max(0.0); } }
    #[inline] pub fn set_offset(&mut self, radians: f32) { if radians.is_finite() { self.offset = radians; } }
    #[inline] pub fn freq(&self) -> f32 { self.freq }
    #[inline] pub fn offset(&self) -> f32 { self.offset }
    #[inline] pub fn phase(&self) -> f32 { self.phase }

    /// Hard-set the running phase (radians, wrapped).
    #[inline]
    pub fn reset(&mut self, radians: f32) {
        self.phase = if radians.is_finite() { wrap_phase_tau(radians) } else { 0.0 };
    }

    /// Read-time phase for the current sample, then advance one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        let p = self.phase + self.offset;
        self.phase += TAU * self.freq / self.sr;
        if self.phase >= TAU {
            self.phase = wrap_phase_tau(self.phase);
        }
        p
    }
}

/// Uniform white noise in [-1, 1) from a small seeded PRNG (no allocation, no locks).
#[derive(Clone, Debug)]
pub struct NoiseSource {
    rng: SmallRng,
}

impl NoiseSource {
    pub fn new(seed: u64) -> Self {
        Self { rng: SmallRng::seed_from_u64(seed) }
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        self.rng.gen_range(-1.0..1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_starts_at_zero() {
        let mut acc = PhaseAccumulator::new(440.0, 48_000.0);
        assert!(shape(Waveform::Sine, acc.tick()).abs() < 1e-6);
    }

    #[test]
    fn phase_stays_wrapped() {
        let mut acc = PhaseAccumulator::new(19_000.0, 48_000.0);
        for _ in 0..10_000 {
            acc.tick();
            assert!((0.0..TAU).contains(&acc.phase()));
        }
    }

    #[test]
    fn offset_does_not_accumulate() {
        let mut a = PhaseAccumulator::new(100.0, 48_000.0);
        let mut b = PhaseAccumulator::new(100.0, 48_000.0);
        b.set_offset(1.0);
        for _ in 0..100 {
            let pa = a.tick();
            let pb = b.tick();
            assert!((pb - pa - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn shapes_are_bounded() {
        for wave in [Waveform::Sine, Waveform::Square, Waveform::Saw, Waveform::Triangle] {
            for i in 0..256 {
                let y = shape(wave, i as f32 * 0.05);
                assert!((-1.0..=1.0).contains(&y), "{:?} {}", wave, y);
            }
        }
    }

    #[test]
    fn names_round_trip() {
        for wave in [Waveform::Sine, Waveform::Square, Waveform::Saw, Waveform::Triangle, Waveform::Noise] {
            assert_eq!(Waveform::from_name(wave.name()), Some(wave));
        }
        assert_eq!(Waveform::from_name("SQUARE"), Some(Waveform::Square));
        assert_eq!(Waveform::from_name("organ"), None);
    }

    #[test]
    fn noise_is_seeded_and_bounded() {
        let mut a = NoiseSource::new(7);
        let mut b = NoiseSource::new(7);
        for _ in 0..512 {
            let x = a.next();
            assert_eq!(x, b.next());
            assert!((-1.0..1.0).contains(&x));
        }
    }
}
