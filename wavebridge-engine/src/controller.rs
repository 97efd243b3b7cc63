//! Control-context orchestrator for one worklet node.
//!
//! Module loads run as tokio tasks. Each load takes a generation number when
//! it is *requested*; when it completes it is published only if no newer load
//! has been requested in the meantime. The render thread repeats the check
//! on install, so a stale module can never overwrite a newer one.

use crate::channel::{ControlMessage, ControlSender, Parameter, RenderCommand};
use crate::error::{BridgeError, BridgeResult};
use crate::gc::gc_handle;
use crate::loader::{ModuleLoader, SourceDescriptor};
use crate::runtime::WorkletNode;
use crate::stats::RenderStats;
use basedrop::Owned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What happened to a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Sent to the render thread as generation `n`
    Published(u64),
    /// A newer load was requested first; result discarded
    Stale(u64),
}

pub struct Controller<L: ModuleLoader> {
    port: ControlSender,
    stats: Arc<RenderStats>,
    loader: Arc<L>,
    latest: Arc<AtomicU64>,
    sample_rate: f32,
}

impl<L: ModuleLoader> Clone for Controller<L> {
    fn clone(&self) -> Self {
        Self {
            port: self.port.clone(),
            stats: self.stats.clone(),
            loader: self.loader.clone(),
            latest: self.latest.clone(),
            sample_rate: self.sample_rate,
        }
    }
}

impl<L: ModuleLoader> Controller<L> {
    pub fn new(port: ControlSender, stats: Arc<RenderStats>, loader: L, sample_rate: f32) -> Self {
        Self { port, stats, loader: Arc::new(loader), latest: Arc::new(AtomicU64::new(0)), sample_rate }
    }

    /// Controller bound to a connected node's port and counters.
    pub fn for_node(node: &WorkletNode, loader: L, sample_rate: f32) -> Self {
        Self::new(node.port().clone(), node.stats().clone(), loader, sample_rate)
    }

    pub fn stats(&self) -> &Arc<RenderStats> {
        &self.stats
    }

    /// Generation of the most recent load request (0 = none yet).
    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Begin loading a module. Must be called from within a tokio runtime.
    pub fn load_module(&self, source: SourceDescriptor) -> JoinHandle<BridgeResult<LoadOutcome>> {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        let this = self.clone();
        log::info!("loading module gen {generation} from {}", source.describe());
        tokio::spawn(async move { this.finish_load(generation, source).await })
    }

    async fn finish_load(&self, generation: u64, source: SourceDescriptor) -> BridgeResult<LoadOutcome> {
        let described = source.describe();
        let mut module = match self.loader.load(source, self.sample_rate).await {
            Ok(module) => module,
            Err(e) => {
                log::error!("module load gen {generation} ({described}) failed: {e}");
                return Err(e.into());
            }
        };

        if self.latest.load(Ordering::Acquire) != generation {
            log::debug!("discarding stale module gen {generation} ({described})");
            return Ok(LoadOutcome::Stale(generation));
        }

        module.prepare(self.sample_rate);
        let module = Owned::new(&gc_handle(), module);
        self.port.send(RenderCommand::Install { generation, module })?;
        log::info!("module gen {generation} published");
        Ok(LoadOutcome::Published(generation))
    }

    /// Forward a parameter change. The render thread drops it if no module is
    /// installed yet; that is not an error here.
    pub fn set_parameter(&self, param: Parameter, value: f32) -> BridgeResult<()> {
        if !self.stats.is_ready() {
            log::debug!("{param} = {value} sent before any module is ready; it will be dropped");
        }
        self.port.send(RenderCommand::SetParameter { param, value })
    }

    pub fn reset_phase(&self, voice: usize) -> BridgeResult<()> {
        if voice != 0 {
            return Err(BridgeError::UnknownVoice(voice));
        }
        self.port.send(RenderCommand::ResetPhase { phase: 0.0 })
    }

    /// Dispatch a UI message. Loads return their task handle.
    pub fn handle_message(&self, message: ControlMessage) -> BridgeResult<Option<JoinHandle<BridgeResult<LoadOutcome>>>> {
        match message {
            ControlMessage::LoadModule { module_text } => {
                Ok(Some(self.load_module(SourceDescriptor::Text(module_text))))
            }
            ControlMessage::LoadModuleUrl { url } => Ok(Some(self.load_module(SourceDescriptor::from_url(&url)))),
            ControlMessage::SetFrequency { value } => self.set_parameter(Parameter::Frequency, value).map(|()| None),
            ControlMessage::SetPhase { value } => self.set_parameter(Parameter::Phase, value).map(|()| None),
            ControlMessage::SetParameter { name, value } => {
                self.set_parameter(name.parse()?, value).map(|()| None)
            }
            ControlMessage::ResetPhase { voice } => self.reset_phase(voice).map(|()| None),
        }
    }

    pub fn handle_json(&self, text: &str) -> BridgeResult<Option<JoinHandle<BridgeResult<LoadOutcome>>>> {
        self.handle_message(ControlMessage::from_json(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::RenderBridge;
    use crate::channel::control_channel;
    use crate::loader::ManifestLoader;

    fn setup() -> (Controller<ManifestLoader>, RenderBridge) {
        let (tx, rx) = control_channel(16);
        let stats = Arc::new(RenderStats::new());
        let bridge = RenderBridge::new(48_000.0, rx, stats.clone());
        (Controller::new(tx, stats, ManifestLoader, 48_000.0), bridge)
    }

    #[tokio::test]
    async fn load_publishes_and_bridge_installs() {
        let (c, mut b) = setup();
        let outcome = c.load_module(SourceDescriptor::text("frequency = 220.0")).await.unwrap().unwrap();
        assert_eq!(outcome, LoadOutcome::Published(1));
        b.drain_commands();
        assert!(b.is_ready());
        assert_eq!(b.generation(), 1);
    }

    #[tokio::test]
    async fn failed_load_reports_error_and_stays_silent() {
        let (c, mut b) = setup();
        let res = c.load_module(SourceDescriptor::text("waveform = \"organ\"")).await.unwrap();
        assert!(matches!(res, Err(BridgeError::ModuleLoad(_))));
        b.drain_commands();
        assert!(!b.is_ready());
    }

    #[tokio::test]
    async fn json_messages_dispatch() {
        let (c, mut b) = setup();
        assert!(c.handle_json(r#"{"type":"setFrequency","value":880.0}"#).unwrap().is_none());
        assert!(matches!(
            c.handle_json(r#"{"type":"resetPhase","voice":2}"#),
            Err(BridgeError::UnknownVoice(2))
        ));
        assert!(matches!(c.handle_json("{not json"), Err(BridgeError::ControlMessage(_))));
        b.drain_commands();
        assert_eq!(b.stats().snapshot().dropped_parameters, 1);
    }
}
