//! Bridge configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields a
//! working setup. The quantum is fixed by the render contract and is not
//! configurable; it is exposed here only so callers can size buffers.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Samples per render callback invocation.
pub const QUANTUM: usize = 128;

/// Default sample rate when neither the device nor the config names one.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default control channel capacity (messages).
pub const DEFAULT_CONTROL_QUEUE_CAPACITY: usize = 256;

/// Default analyser window, in samples.
pub const DEFAULT_FFT_SIZE: usize = 2048;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub sample_rate: u32,
    pub control_queue_capacity: usize,
    pub analyser_fft_size: usize,
    pub scope_fps: u32,
    pub meter_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            control_queue_capacity: DEFAULT_CONTROL_QUEUE_CAPACITY,
            analyser_fft_size: DEFAULT_FFT_SIZE,
            scope_fps: 30,
            meter_interval_ms: 1000,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(text: &str) -> BridgeResult<Self> {
        let cfg: Self = toml::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> BridgeResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.sample_rate == 0 {
            return Err(BridgeError::Config("sample_rate must be > 0".into()));
        }
        if self.control_queue_capacity == 0 {
            return Err(BridgeError::Config("control_queue_capacity must be > 0".into()));
        }
        if !self.analyser_fft_size.is_power_of_two() || !(32..=32_768).contains(&self.analyser_fft_size) {
            return Err(BridgeError::Config(format!(
                "analyser_fft_size must be a power of two in 32..=32768, got {}",
                self.analyser_fft_size
            )));
        }
        if self.scope_fps == 0 {
            return Err(BridgeError::Config("scope_fps must be > 0".into()));
        }
        Ok(())
    }

    /// Real-time budget of one quantum at the configured rate.
    pub fn quantum_budget(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(QUANTUM as f64 / f64::from(self.sample_rate.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = BridgeConfig::from_toml_str("sample_rate = 44100\nscope_fps = 60\n").unwrap();
        assert_eq!(cfg.sample_rate, 44_100);
        assert_eq!(cfg.scope_fps, 60);
        assert_eq!(cfg.analyser_fft_size, DEFAULT_FFT_SIZE);
    }

    #[test]
    fn rejects_bad_fft_size() {
        assert!(BridgeConfig::from_toml_str("analyser_fft_size = 1000").is_err());
    }

    #[test]
    fn quantum_budget_at_48k() {
        let budget = BridgeConfig::default().quantum_budget();
        assert!((budget.as_secs_f64() * 1000.0 - 2.6667).abs() < 1e-3);
    }
}
