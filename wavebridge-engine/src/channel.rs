//! Control channel: control thread → render thread.
//!
//! Two layers:
//! - [`ControlMessage`] is the JSON schema the UI layer speaks. It carries
//!   only scalars and strings.
//! - [`RenderCommand`] is what actually crosses into the render thread over a
//!   lock-free SPSC ring (`rtrb`). Module loads never cross as text: the
//!   controller resolves them first and sends the finished module.
//!
//! The render side drains the ring at quantum boundaries and never blocks.
//! The producer is wrapped in a mutex so several control tasks can share it;
//! only the control side ever takes that lock.

use crate::error::{BridgeError, BridgeResult};
use crate::loader::LoadedModule;
use basedrop::Owned;
use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

/// Messages accepted from the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControlMessage {
    /// `{"type":"loadModule","moduleText":"..."}`
    LoadModule { module_text: String },
    /// `{"type":"loadModuleUrl","url":"file:///..."}`
    LoadModuleUrl { url: String },
    /// `{"type":"setFrequency","value":880}`
    SetFrequency { value: f32 },
    /// `{"type":"setPhase","value":1.57}`
    SetPhase { value: f32 },
    /// `{"type":"setParameter","name":"frequency","value":880}`
    SetParameter { name: String, value: f32 },
    /// `{"type":"resetPhase","voice":0}`
    ResetPhase {
        #[serde(default)]
        voice: usize,
    },
}

impl ControlMessage {
    pub fn from_json(text: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Module parameters addressable by name or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    Frequency,
    Phase,
}

impl Parameter {
    pub fn index(self) -> u32 {
        match self {
            Self::Frequency => 0,
            Self::Phase => 1,
        }
    }

    pub fn from_index(index: u32) -> BridgeResult<Self> {
        match index {
            0 => Ok(Self::Frequency),
            1 => Ok(Self::Phase),
            other => Err(BridgeError::UnknownParameter(format!("index {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Frequency => "frequency",
            Self::Phase => "phase",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frequency" => Ok(Self::Frequency),
            "phase" => Ok(Self::Phase),
            other => Err(BridgeError::UnknownParameter(other.to_string())),
        }
    }
}

/// Commands consumed by the render thread.
///
/// `Install` carries the module inside a `basedrop::Owned`, so whichever
/// instance the render thread lets go of is freed on the collector thread.
pub enum RenderCommand {
    Install { generation: u64, module: Owned<LoadedModule> },
    SetParameter { param: Parameter, value: f32 },
    ResetPhase { phase: f32 },
}

impl fmt::Debug for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install { generation, module } => f
                .debug_struct("Install")
                .field("generation", generation)
                .field("module", &module.name())
                .finish(),
            Self::SetParameter { param, value } => {
                f.debug_struct("SetParameter").field("param", param).field("value", value).finish()
            }
            Self::ResetPhase { phase } => f.debug_struct("ResetPhase").field("phase", phase).finish(),
        }
    }
}

/// Create a control channel pair.
///
/// Returns (sender for the control side, receiver for the render thread).
pub fn control_channel(capacity: usize) -> (ControlSender, RenderReceiver) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    (
        ControlSender { producer: Arc::new(Mutex::new(producer)), capacity: capacity.max(1) },
        RenderReceiver { consumer },
    )
}

/// Control-side end; cheap to clone.
#[derive(Clone)]
pub struct ControlSender {
    producer: Arc<Mutex<Producer<RenderCommand>>>,
    capacity: usize,
}

impl ControlSender {
    /// Push without blocking the render thread.
    pub fn send(&self, command: RenderCommand) -> BridgeResult<()> {
        let mut producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        producer.push(command).map_err(|_| BridgeError::QueueFull { capacity: self.capacity })
    }

    /// `true` once the render side has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.producer.lock().unwrap_or_else(PoisonError::into_inner).is_abandoned()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Render-side end. Never blocks.
pub struct RenderReceiver {
    consumer: Consumer<RenderCommand>,
}

impl RenderReceiver {
    #[inline]
    pub fn pop(&mut self) -> Option<RenderCommand> {
        self.consumer.pop().ok()
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.consumer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ui_messages() {
        let msg = ControlMessage::from_json(r#"{"type":"loadModule","moduleText":"waveform = \"sine\""}"#).unwrap();
        assert_eq!(msg, ControlMessage::LoadModule { module_text: "waveform = \"sine\"".into() });

        let msg = ControlMessage::from_json(r#"{"type":"setFrequency","value":880}"#).unwrap();
        assert_eq!(msg, ControlMessage::SetFrequency { value: 880.0 });

        let msg = ControlMessage::from_json(r#"{"type":"resetPhase"}"#).unwrap();
        assert_eq!(msg, ControlMessage::ResetPhase { voice: 0 });

        assert!(ControlMessage::from_json(r#"{"type":"explode"}"#).is_err());
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = ControlMessage::SetPhase { value: 0.5 }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"setPhase","value":0.5}"#);
    }

    #[test]
    fn parameters_by_name_and_index() {
        assert_eq!("frequency".parse::<Parameter>().unwrap(), Parameter::Frequency);
        assert!("gain".parse::<Parameter>().is_err());
        for p in [Parameter::Frequency, Parameter::Phase] {
            assert_eq!(Parameter::from_index(p.index()).unwrap(), p);
        }
        assert!(Parameter::from_index(7).is_err());
    }

    #[test]
    fn delivers_in_order_and_reports_full() {
        let (tx, mut rx) = control_channel(2);
        tx.send(RenderCommand::SetParameter { param: Parameter::Frequency, value: 1.0 }).unwrap();
        tx.send(RenderCommand::ResetPhase { phase: 0.0 }).unwrap();
        assert!(matches!(
            tx.send(RenderCommand::ResetPhase { phase: 1.0 }),
            Err(BridgeError::QueueFull { capacity: 2 })
        ));
        assert_eq!(rx.pending(), 2);
        assert!(matches!(rx.pop(), Some(RenderCommand::SetParameter { value, .. }) if value == 1.0));
        assert!(matches!(rx.pop(), Some(RenderCommand::ResetPhase { .. })));
        assert!(rx.pop().is_none());
    }
}
