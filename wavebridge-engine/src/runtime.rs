//! Native audio-graph objects: the context, the worklet node the engine
//! builds, and the render processor the host pulls quanta from.
//!
//! `AudioContext` and `WorkletNode` live on the control side and are only
//! ever referred to across the boundary by [`Handle`]. `WorkletProcessor` is
//! the render-thread half; it is moved into the host when the node is
//! connected.

use crate::bridge::RenderBridge;
use crate::channel::{ControlSender, Parameter, RenderCommand};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{Handle, Native};
use crate::scope::AnalyserTap;
use crate::stats::RenderStats;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

/// Lifecycle of an audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextState {
    Suspended = 0,
    Running = 1,
    Closed = 2,
}

impl ContextState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Suspended,
            1 => Self::Running,
            _ => Self::Closed,
        }
    }
}

/// Messages delivered to the `on_state_message` continuation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Initializing,
    GraphReady,
    Context(ContextState),
    Failed(String),
}

pub type StateSink = Box<dyn FnMut(EngineState) + Send>;

/// Top-level native audio object. Owns the graph's nodes; closing it tears
/// the graph down and invalidates every handle into it.
pub struct AudioContext {
    sample_rate: f32,
    state: AtomicU8,
    nodes: Mutex<Vec<Arc<WorkletNode>>>,
    state_sink: Mutex<Option<StateSink>>,
}

impl AudioContext {
    pub fn new(sample_rate: f32) -> Arc<Self> {
        Arc::new(Self {
            sample_rate,
            state: AtomicU8::new(ContextState::Suspended as u8),
            nodes: Mutex::new(Vec::new()),
            state_sink: Mutex::new(None),
        })
    }

    #[inline] pub fn sample_rate(&self) -> f32 { self.sample_rate }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Start (or restart) processing; a closed context stays closed.
    pub fn resume(&self) {
        self.transition(ContextState::Running);
    }

    pub fn suspend(&self) {
        self.transition(ContextState::Suspended);
    }

    /// Tear down the graph. Handles to the context and its nodes stop resolving.
    pub fn close(&self) {
        self.transition(ContextState::Closed);
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn transition(&self, to: ContextState) {
        let from = self.state();
        if from == ContextState::Closed || from == to {
            return;
        }
        self.state.store(to as u8, Ordering::Release);
        log::debug!("audio context {:?} -> {:?}", from, to);
        if let Some(sink) = self.state_sink.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            sink(EngineState::Context(to));
        }
    }

    pub(crate) fn adopt(&self, node: Arc<WorkletNode>) {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner).push(node);
    }

    pub(crate) fn set_state_sink(&self, sink: StateSink) {
        *self.state_sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Native for AudioContext {
    fn kind(&self) -> &'static str {
        "audio-context"
    }

    fn is_alive(&self) -> bool {
        self.state() != ContextState::Closed
    }
}

/// Render-thread half of a worklet node.
pub struct WorkletProcessor {
    bridge: RenderBridge,
    tap: Option<AnalyserTap>,
}

impl WorkletProcessor {
    pub fn new(bridge: RenderBridge) -> Self {
        Self { bridge, tap: None }
    }

    pub fn attach_tap(&mut self, tap: AnalyserTap) {
        self.tap = Some(tap);
    }

    #[inline] pub fn bridge(&self) -> &RenderBridge { &self.bridge }
    #[inline] pub fn bridge_mut(&mut self) -> &mut RenderBridge { &mut self.bridge }

    /// Host render callback: one quantum into `outputs[0]`, mirrored to any
    /// further channels. Always asks to be kept alive.
    pub fn process(&mut self, _inputs: &[&[f32]], outputs: &mut [&mut [f32]], _params: &[f32]) -> bool {
        // quantum boundary: apply whatever the control side queued
        self.bridge.drain_commands();
        if let Some((first, rest)) = outputs.split_first_mut() {
            self.bridge.render(first);
            for extra in rest.iter_mut() {
                let n = extra.len().min(first.len());
                extra[..n].copy_from_slice(&first[..n]);
                extra[n..].fill(0.0);
            }
            if let Some(tap) = self.tap.as_mut() {
                tap.push_block(first);
            }
        }
        true
    }

    /// Mono convenience over [`process`](Self::process).
    #[inline]
    pub fn render_mono(&mut self, out: &mut [f32]) -> bool {
        self.process(&[], &mut [out], &[])
    }
}

/// Control-side half of the node the engine builds during the handshake.
pub struct WorkletNode {
    name: String,
    context: Weak<AudioContext>,
    handle: OnceLock<Handle>,
    port: ControlSender,
    stats: Arc<RenderStats>,
    processor: Mutex<Option<WorkletProcessor>>,
    connected: AtomicBool,
}

impl WorkletNode {
    pub(crate) fn new(
        name: impl Into<String>,
        context: &Arc<AudioContext>,
        port: ControlSender,
        stats: Arc<RenderStats>,
        processor: WorkletProcessor,
    ) -> Self {
        Self {
            name: name.into(),
            context: Arc::downgrade(context),
            handle: OnceLock::new(),
            port,
            stats,
            processor: Mutex::new(Some(processor)),
            connected: AtomicBool::new(false),
        }
    }

    pub(crate) fn bind_handle(&self, handle: Handle) {
        let _ = self.handle.set(handle);
    }

    /// Handle assigned at registration; bound before the node is visible to anyone.
    pub fn handle(&self) -> Option<Handle> {
        self.handle.get().copied()
    }

    fn label(&self) -> String {
        match self.handle() {
            Some(h) => format!("{} {h}", self.name),
            None => self.name.clone(),
        }
    }

    #[inline] pub fn name(&self) -> &str { &self.name }
    #[inline] pub fn port(&self) -> &ControlSender { &self.port }
    #[inline] pub fn stats(&self) -> &Arc<RenderStats> { &self.stats }
    #[inline] pub fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

    pub fn context(&self) -> Option<Arc<AudioContext>> {
        self.context.upgrade()
    }

    /// Wire the node into the graph: attach the analyser tap (if any) and hand
    /// the render processor to the caller, who moves it into the host.
    pub fn connect(&self, tap: Option<AnalyserTap>) -> BridgeResult<WorkletProcessor> {
        let mut processor = self
            .processor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| BridgeError::AlreadyConnected(self.label()))?;
        if let Some(tap) = tap {
            processor.attach_tap(tap);
        }
        self.connected.store(true, Ordering::Release);
        log::debug!("{} connected", self.label());
        Ok(processor)
    }

    /// Set parameter `index` (0 = frequency, 1 = phase offset). Takes effect
    /// at the next quantum; `at_time` is accepted for interface parity only.
    pub fn set_parameter_value(&self, index: u32, value: f32, at_time: f64) -> BridgeResult<()> {
        self.ensure_connected()?;
        let param = Parameter::from_index(index)?;
        log::trace!("{}: {} = {} (at {:.3}s)", self.label(), param, value, at_time);
        self.port.send(RenderCommand::SetParameter { param, value })
    }

    /// Restart voice `voice` at phase 0. Only voice 0 exists.
    pub fn reset_phase(&self, voice: usize) -> BridgeResult<()> {
        self.ensure_connected()?;
        if voice != 0 {
            return Err(BridgeError::UnknownVoice(voice));
        }
        self.port.send(RenderCommand::ResetPhase { phase: 0.0 })
    }

    fn ensure_connected(&self) -> BridgeResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BridgeError::NotConnected(self.label()))
        }
    }
}

impl Native for WorkletNode {
    fn kind(&self) -> &'static str {
        "worklet-node"
    }

    fn is_alive(&self) -> bool {
        self.context.upgrade().is_some_and(|c| c.is_alive())
    }
}
