//! Wavebridge Engine: real-time render bridge for asynchronously loaded
//! computation modules.
//!
//! Crate layout:
//! - [`registry`]  : opaque handles for native objects
//! - [`module`]    : `ComputationModule` trait and the built-in oscillator
//! - [`loader`]    : source descriptors and async module loading
//! - [`channel`]   : SPSC control channel (control thread -> render thread)
//! - [`bridge`]    : render-thread owner of the module; silence until ready
//! - [`runtime`]   : audio context, worklet node, render processor
//! - [`handshake`] : engine-side graph construction with one-shot continuations
//! - [`controller`]: control-side orchestration (loads, parameters, UI messages)
//! - [`scope`]     : analyser tap and visualization sampler
//! - [`host`]      : device/offline hosts pulling 128-sample quanta
//!
//! The render thread never allocates, locks, logs or fails. Everything it
//! cannot do is counted in [`RenderStats`] and rendered as silence.

pub mod bridge;
pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod gc;
pub mod handshake;
pub mod host;
pub mod loader;
pub mod module;
pub mod registry;
pub mod runtime;
pub mod scope;
pub mod stats;

pub use bridge::RenderBridge;
pub use channel::{control_channel, ControlMessage, ControlSender, Parameter, RenderCommand};
pub use config::{BridgeConfig, QUANTUM};
pub use controller::{Controller, LoadOutcome};
pub use error::{BridgeError, BridgeResult, ModuleLoadError};
pub use handshake::{initialize_graph, Engine};
pub use host::{OfflineHost, QuantumAdapter};
pub use loader::{ManifestLoader, ModuleLoader, SourceDescriptor};
pub use module::{ComputationModule, Oscillator};
pub use registry::{Handle, HandleRegistry, SharedRegistry};
pub use runtime::{AudioContext, ContextState, EngineState, WorkletNode, WorkletProcessor};
pub use scope::{analyser, Analyser, VisualizationSampler};
pub use stats::RenderStats;
