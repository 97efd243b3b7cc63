//! Module sources and the loader that turns them into computation modules.
//!
//! Loading always happens in the control context. The render thread only
//! ever receives a fully constructed, prepared module.
//!
//! Module source text is a small TOML manifest:
//!
//! ```toml
//! name = "sine-oscillator"
//! waveform = "sine"        # sine | square | saw | triangle | noise
//! frequency = 440.0        # Hz
//! phase_offset = 0.0       # radians
//! amplitude = 1.0          # 0..=1
//! seed = 0                 # noise only
//! ```

use crate::error::ModuleLoadError;
use crate::module::{ComputationModule, Oscillator};
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use wavebridge_core::waveform::Waveform;

/// A module ready to be published to the render thread.
pub type LoadedModule = Box<dyn ComputationModule>;

/// Where module source comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Raw manifest text
    Text(String),
    /// Local file (also produced by `file://` URLs)
    Path(PathBuf),
    /// Remote URL
    Url(String),
}

impl SourceDescriptor {
    pub fn text(source: impl Into<String>) -> Self {
        Self::Text(source.into())
    }

    /// `file://` URLs become paths; anything else stays a URL.
    pub fn from_url(url: &str) -> Self {
        match url.strip_prefix("file://") {
            Some(path) => Self::Path(PathBuf::from(path)),
            None => Self::Url(url.to_string()),
        }
    }

    /// Interpret a CLI-style argument: a URL, an existing path, or inline text.
    pub fn from_arg(arg: &str) -> Self {
        if arg.contains("://") {
            Self::from_url(arg)
        } else if std::path::Path::new(arg).exists() {
            Self::Path(PathBuf::from(arg))
        } else {
            Self::Text(arg.to_string())
        }
    }

    /// Short form for log lines.
    pub fn describe(&self) -> String {
        match self {
            Self::Text(t) => format!("inline manifest ({} bytes)", t.len()),
            Self::Path(p) => p.display().to_string(),
            Self::Url(u) => u.clone(),
        }
    }
}

fn default_name() -> String { "oscillator".to_string() }
fn default_waveform() -> String { "sine".to_string() }
fn default_frequency() -> f32 { 440.0 }
fn default_amplitude() -> f32 { 1.0 }

/// Parsed module manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleManifest {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_waveform")]
    pub waveform: String,
    #[serde(default = "default_frequency")]
    pub frequency: f32,
    #[serde(default)]
    pub phase_offset: f32,
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
    #[serde(default)]
    pub seed: u64,
}

impl ModuleManifest {
    pub fn parse(text: &str) -> Result<Self, ModuleLoadError> {
        Ok(toml::from_str(text)?)
    }

    /// Validate and build the oscillator this manifest describes.
    pub fn build(&self, sample_rate: f32) -> Result<Oscillator, ModuleLoadError> {
        let wave = Waveform::from_name(&self.waveform)
            .ok_or_else(|| ModuleLoadError::InvalidManifest(format!("unknown waveform `{}`", self.waveform)))?;
        if !self.frequency.is_finite() || self.frequency < 0.0 {
            return Err(ModuleLoadError::InvalidManifest(format!("frequency {} out of range", self.frequency)));
        }
        if !self.phase_offset.is_finite() {
            return Err(ModuleLoadError::InvalidManifest("phase_offset must be finite".into()));
        }
        if !(0.0..=1.0).contains(&self.amplitude) {
            return Err(ModuleLoadError::InvalidManifest(format!("amplitude {} not in 0..=1", self.amplitude)));
        }
        Ok(Oscillator::new(self.name.clone(), wave, self.frequency, sample_rate)
            .with_phase_offset(self.phase_offset)
            .with_amplitude(self.amplitude)
            .with_seed(self.seed))
    }
}

/// Resolves a source descriptor into a module, asynchronously.
pub trait ModuleLoader: Send + Sync + 'static {
    fn load(
        &self,
        source: SourceDescriptor,
        sample_rate: f32,
    ) -> impl Future<Output = Result<LoadedModule, ModuleLoadError>> + Send;
}

/// Loads TOML manifests from inline text or local files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestLoader;

impl ModuleLoader for ManifestLoader {
    async fn load(&self, source: SourceDescriptor, sample_rate: f32) -> Result<LoadedModule, ModuleLoadError> {
        let text = match source {
            SourceDescriptor::Text(text) => text,
            SourceDescriptor::Path(path) => tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| ModuleLoadError::Io { path: path.display().to_string(), source })?,
            SourceDescriptor::Url(url) => {
                let scheme = url.split("://").next().unwrap_or_default().to_string();
                return Err(ModuleLoadError::UnsupportedScheme(scheme));
            }
        };
        let manifest = ModuleManifest::parse(&text)?;
        Ok(Box::new(manifest.build(sample_rate)?))
    }
}
