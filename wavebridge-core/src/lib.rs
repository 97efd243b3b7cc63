#![cfg_attr(not(feature = "std"), no_std)]
//! WaveBridge Core — no_std-ready DSP primitives with optional fast-math.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` and use `libm`/`micromath` math backends
//! - `fast-math`: polynomial sine in the oscillator hot path
//!
//! Modules
//! - [`dsp`]      : math backend, phase wrapping, sanitizing, analyser byte mapping
//! - [`waveform`] : waveform shapes, phase accumulator, seeded noise
//!
//! Design
//! - No heap allocations; everything here is safe to call from a render callback
//! - Shapes are pure functions of phase; state lives in small `Copy` structs

pub mod dsp;
pub mod waveform;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::dsp::{
        byte_to_unit, clamp, fast_sin, flush_non_finite, kill_denormals, sample_to_byte,
        sanitize_block, wrap_phase_tau, BYTE_CENTER, TAU,
    };
    pub use crate::waveform::{shape, NoiseSource, PhaseAccumulator, Waveform};
}

#[cfg(test)]
mod smoke {

    #[test]
    fn prelude_exists() {
        use crate::prelude::*;
        let mut acc = PhaseAccumulator::new(440.0, 48_000.0);
        let _ = shape(Waveform::Triangle, acc.tick());
        let _ = sample_to_byte(0.25);
    }
}
