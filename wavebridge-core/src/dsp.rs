//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Optional `fast-math` approximations for hot paths
//! - Clean, side-effect free helpers that are easy to test
//!
//! Conventions:
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Argument and return domains are documented per function.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;
use num_traits::Float;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // micromath preferred if explicitly requested (works in no_std)
    if #[cfg(feature = "micromath")] {
        use micromath::F32Ext as _;
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_floor(x: f32) -> f32 { x.floor() }
    // libm (C math) in no_std
    } else if #[cfg(feature = "no-std")] {
        #[inline] fn m_sin(x: f32) -> f32 { libm::sinf(x) }
        #[inline] fn m_floor(x: f32) -> f32 { libm::floorf(x) }
    // std backend
    } else {
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_floor(x: f32) -> f32 { x.floor() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

/// Midpoint of the unsigned 8-bit time-domain representation (silence).
pub const BYTE_CENTER: u8 = 128;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

/// Wrap a phase in radians into [0, 2π).
#[inline]
pub fn wrap_phase_tau(p: f32) -> f32 {
    let w = p - TAU * m_floor(p / TAU);
    // floor rounding can land exactly on TAU for tiny negative inputs
    if w >= TAU { 0.0 } else { w }
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < EPS_SMALL { 0.0 } else { x }
}

/// Replace NaN/±inf with zero; finite values pass through untouched.
#[inline]
pub fn flush_non_finite<T: Float>(x: T) -> T {
    if x.is_finite() { x } else { T::zero() }
}

/// Make a rendered block safe to hand to a device: non-finite samples become
/// silence and everything is clamped to [-1, 1].
#[inline]
pub fn sanitize_block(block: &mut [f32]) {
    for s in block.iter_mut() {
        *s = clamp(kill_denormals(flush_non_finite(*s)), -1.0, 1.0);
    }
}

// --------------------------------- Sine ------------------------------------------

/// Sine of `x` radians. With `fast-math` enabled the argument is reduced to
/// [-π/2, π/2] and fed to a 7th-order odd polynomial (max abs error ~1.6e-4,
/// worst at ±π/2); otherwise the backend `sin`.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            use core::f32::consts::FRAC_PI_2;

            // [-π, π]
            let mut xr = x - TAU * m_floor(x / TAU + 0.5);
            // sin(π - x) = sin(x) folds the outer quarters in
            if xr > FRAC_PI_2 {
                xr = PI - xr;
            } else if xr < -FRAC_PI_2 {
                xr = -PI - xr;
            }

            // x - x^3/3! + x^5/5! - x^7/7!
            let x2 = xr * xr;
            xr * (1.0 + x2 * (-1.666_666_7e-1 + x2 * (8.333_333e-3 + x2 * -1.984_127e-4)))
        } else {
            m_sin(x)
        }
    }
}

// --------------------------------- Byte mapping ----------------------------------

/// Map a [-1, 1] sample to the unsigned 8-bit time-domain form used by the
/// analyser: `128 * (1 + x)`, clamped to [0, 255].
#[inline]
pub fn sample_to_byte(x: f32) -> u8 {
    let scaled = 128.0 * (1.0 + flush_non_finite(x));
    clamp(m_floor(scaled), 0.0, 255.0) as u8
}

/// Inverse of [`sample_to_byte`] normalized so that silence maps to 1.0 and
/// the full range spans [0, 2).
#[inline]
pub fn byte_to_unit(b: u8) -> f32 {
    f32::from(b) / f32::from(BYTE_CENTER)
}

// --------------------------------- Tests (std only) ------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_bounds_both_sides() {
        assert_eq!(clamp(2.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(-2.0, -1.0, 1.0), -1.0);
        assert_eq!(clamp(0.25, -1.0, 1.0), 0.25);
    }

    #[test]
    fn phase_wraps_into_range() {
        for p in [-10.0, -TAU, -0.1, 0.0, 1.0, TAU, TAU + 0.5, 100.0] {
            let w = wrap_phase_tau(p);
            assert!((0.0..TAU).contains(&w), "p={} w={}", p, w);
        }
        assert!((wrap_phase_tau(TAU + 0.5) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn non_finite_is_flushed() {
        let mut block = [f32::NAN, f32::INFINITY, -f32::INFINITY, 0.5, 3.0];
        sanitize_block(&mut block);
        assert_eq!(block, [0.0, 0.0, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn byte_mapping_matches_analyser_convention() {
        assert_eq!(sample_to_byte(0.0), 128);
        assert_eq!(sample_to_byte(-1.0), 0);
        assert_eq!(sample_to_byte(1.0), 255);
        assert_eq!(sample_to_byte(f32::NAN), 128);
        assert!((byte_to_unit(128) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn fast_sin_tracks_sin() {
        // several periods either side of zero, both ends of [-π, π] included
        for i in 0..=4096 {
            let x = -4.0 * TAU + (i as f32) * (8.0 * TAU / 4096.0);
            assert!((fast_sin(x) - x.sin()).abs() < 1e-3, "x={} got={} want={}", x, fast_sin(x), x.sin());
        }
        for x in [-PI, -3.0, -PI / 2.0, 3.0, PI, PI - 1e-3, -PI + 1e-3] {
            assert!((fast_sin(x) - x.sin()).abs() < 1e-3, "x={}", x);
        }
    }

    #[cfg(feature = "fast-math")]
    #[test]
    fn fast_sin_polynomial_is_odd_and_bounded() {
        for i in 0..1000 {
            let x = (i as f32) * 0.01;
            assert!((fast_sin(-x) + fast_sin(x)).abs() < 1e-6, "x={}", x);
            assert!(fast_sin(x).abs() <= 1.0 + 1e-4, "x={}", x);
        }
        assert!((fast_sin(3.0) - 0.141_120_01).abs() < 1e-3);
    }
}
