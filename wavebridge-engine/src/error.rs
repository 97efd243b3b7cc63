//! Error types for the render bridge.
//!
//! Nothing here is ever constructed on the render thread. Render-side
//! conditions (not ready, short writes, module faults) degrade to silence and
//! are counted in [`RenderStats`](crate::stats::RenderStats) instead.

use crate::registry::Handle;
use thiserror::Error;

/// Failure to obtain a computation module from a source descriptor.
#[derive(Error, Debug)]
pub enum ModuleLoadError {
    /// Reading the module source failed
    #[error("failed to read module source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid TOML or has the wrong shape
    #[error("failed to parse module manifest: {0}")]
    Parse(#[from] toml::de::Error),

    /// The descriptor names a transport this loader cannot fetch from
    #[error("unsupported module source scheme: {0}")]
    UnsupportedScheme(String),

    /// The manifest parsed but its values are unusable
    #[error("invalid module manifest: {0}")]
    InvalidManifest(String),
}

/// Errors surfaced to control-context callers.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    ModuleLoad(#[from] ModuleLoadError),

    /// Handle was never issued, its referent is gone, or it names another kind of object
    #[error("unknown handle {0}")]
    UnknownHandle(Handle),

    /// Node has not been wired into the graph yet
    #[error("{0} is not connected to the audio graph")]
    NotConnected(String),

    /// Node's render processor was already handed to a host
    #[error("{0} is already connected")]
    AlreadyConnected(String),

    /// Control channel is full; the render thread is not draining
    #[error("control channel full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("unknown parameter {0}")]
    UnknownParameter(String),

    /// Only voice 0 exists
    #[error("unknown voice {0}")]
    UnknownVoice(usize),

    /// A one-shot continuation was invoked twice or never registered
    #[error("continuation {0} already consumed")]
    ContinuationConsumed(u64),

    /// The engine dropped the graph-ready continuation without invoking it
    #[error("init handshake aborted: {0}")]
    HandshakeAborted(String),

    #[error("invalid control message: {0}")]
    ControlMessage(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for control-context bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
