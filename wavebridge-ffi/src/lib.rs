//! C ABI wrapper for the Wavebridge render bridge.
//!
//! Every object crosses the boundary as a `u32` session handle; `0` is never
//! a valid handle. Control functions return a status code (`WB_OK` or one of
//! the negative `WB_ERR_*` values) and log the underlying error.
//!
//! Threading
//! - Control functions may be called from any thread.
//! - `wavebridge_render` is meant for the audio thread. The session table is
//!   copy-on-write behind an `ArcSwap`: lookups are lock-free and only
//!   create/destroy publish a new table, so control traffic never stalls a
//!   render. If another thread is rendering the same session it writes silence.
//! - Do not destroy a session while another thread is rendering it.

use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::sync::atomic::{AtomicU32, Ordering};
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, OnceLock};
use wavebridge_engine::{
    initialize_graph, AudioContext, BridgeConfig, BridgeError, Controller, Engine, ManifestLoader, Parameter,
    QuantumAdapter, SharedRegistry, SourceDescriptor, WorkletNode,
};

pub const WB_OK: i32 = 0;
pub const WB_ERR_UNKNOWN_HANDLE: i32 = -1;
pub const WB_ERR_INVALID_ARGUMENT: i32 = -2;
pub const WB_ERR_QUEUE_FULL: i32 = -3;
pub const WB_ERR_NOT_CONNECTED: i32 = -4;
pub const WB_ERR_INTERNAL: i32 = -5;

fn status(e: &BridgeError) -> i32 {
    match e {
        BridgeError::UnknownHandle(_) => WB_ERR_UNKNOWN_HANDLE,
        BridgeError::QueueFull { .. } => WB_ERR_QUEUE_FULL,
        BridgeError::NotConnected(_) => WB_ERR_NOT_CONNECTED,
        BridgeError::UnknownParameter(_) | BridgeError::UnknownVoice(_) | BridgeError::ControlMessage(_) => {
            WB_ERR_INVALID_ARGUMENT
        }
        _ => WB_ERR_INTERNAL,
    }
}

/// One context + worklet node, already through the init handshake.
struct Session {
    runtime: tokio::runtime::Runtime,
    context: Arc<AudioContext>,
    controller: Controller<ManifestLoader>,
    adapter: Mutex<QuantumAdapter>,
}

impl Session {
    fn open(sample_rate: f32) -> Result<Self, Box<dyn std::error::Error>> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("wavebridge-ffi")
            .enable_all()
            .build()?;

        let registry = SharedRegistry::new();
        let engine = Engine::new(registry.clone(), BridgeConfig::default());
        let context = AudioContext::new(sample_rate);
        let root = registry.register(&context);
        let node = runtime.block_on(initialize_graph(&engine, root, sample_rate, |state| {
            log::debug!("wavebridge-ffi: engine {state:?}");
        }))?;
        let node = registry.resolve::<WorkletNode>(node)?;
        let adapter = QuantumAdapter::new(node.connect(None)?);
        let controller = Controller::for_node(&node, ManifestLoader, sample_rate);
        context.resume();

        Ok(Self { runtime, context, controller, adapter: Mutex::new(adapter) })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.context.close();
    }
}

static NEXT_HANDLE: AtomicU32 = AtomicU32::new(1);

type SessionTable = HashMap<u32, Arc<Session>>;

fn sessions() -> &'static ArcSwap<SessionTable> {
    static SESSIONS: OnceLock<ArcSwap<SessionTable>> = OnceLock::new();
    SESSIONS.get_or_init(|| ArcSwap::from_pointee(HashMap::new()))
}

fn session(handle: u32) -> Option<Arc<Session>> {
    sessions().load().get(&handle).cloned()
}

fn with_session(handle: u32, f: impl FnOnce(&Session) -> Result<(), BridgeError>) -> i32 {
    let Some(s) = session(handle) else {
        log::warn!("wavebridge-ffi: unknown session {handle}");
        return WB_ERR_UNKNOWN_HANDLE;
    };
    match f(&s) {
        Ok(()) => WB_OK,
        Err(e) => {
            log::error!("wavebridge-ffi: session {handle}: {e}");
            status(&e)
        }
    }
}

// --- Creation / destruction -------------------------------------------------------

/// Create a session rendering at `sample_rate`. Returns 0 on failure.
#[no_mangle]
pub extern "C" fn wavebridge_create(sample_rate: f32) -> u32 {
    if !sample_rate.is_finite() || sample_rate < 1.0 {
        log::error!("wavebridge-ffi: invalid sample rate {sample_rate}");
        return 0;
    }
    match Session::open(sample_rate) {
        Ok(s) => {
            let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
            let s = Arc::new(s);
            sessions().rcu(|table| {
                let mut table = SessionTable::clone(table);
                table.insert(handle, s.clone());
                table
            });
            log::info!("wavebridge-ffi: session {handle} at {sample_rate} Hz");
            handle
        }
        Err(e) => {
            log::error!("wavebridge-ffi: failed to create session: {e}");
            0
        }
    }
}

/// Destroy a session. Its handle never becomes valid again.
#[no_mangle]
pub extern "C" fn wavebridge_destroy(handle: u32) -> i32 {
    let previous = sessions().rcu(|table| {
        let mut table = SessionTable::clone(table);
        table.remove(&handle);
        table
    });
    if previous.contains_key(&handle) { WB_OK } else { WB_ERR_UNKNOWN_HANDLE }
}

// --- Control ---------------------------------------------------------------------

/// Start loading a module from manifest text, a path, or a `file://` URL.
/// Returns as soon as the load is queued; poll `wavebridge_is_ready`.
///
/// # Safety
/// `source` must be null or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn wavebridge_load_module(handle: u32, source: *const c_char) -> i32 {
    if source.is_null() {
        return WB_ERR_INVALID_ARGUMENT;
    }
    // SAFETY: non-null and NUL-terminated per the contract above
    let Ok(source) = unsafe { CStr::from_ptr(source) }.to_str() else {
        return WB_ERR_INVALID_ARGUMENT;
    };
    let source = SourceDescriptor::from_arg(source);
    with_session(handle, |s| {
        let _guard = s.runtime.enter();
        // outcome and failures are logged by the controller
        drop(s.controller.load_module(source));
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn wavebridge_set_frequency(handle: u32, hz: f32) -> i32 {
    with_session(handle, |s| s.controller.set_parameter(Parameter::Frequency, hz))
}

#[no_mangle]
pub extern "C" fn wavebridge_set_phase(handle: u32, radians: f32) -> i32 {
    with_session(handle, |s| s.controller.set_parameter(Parameter::Phase, radians))
}

#[no_mangle]
pub extern "C" fn wavebridge_reset_phase(handle: u32, voice: u32) -> i32 {
    with_session(handle, |s| s.controller.reset_phase(voice as usize))
}

/// 1 if a module is installed, 0 if not, negative for an unknown handle.
#[no_mangle]
pub extern "C" fn wavebridge_is_ready(handle: u32) -> i32 {
    match session(handle) {
        Some(s) => i32::from(s.controller.stats().is_ready()),
        None => WB_ERR_UNKNOWN_HANDLE,
    }
}

// --- Rendering -------------------------------------------------------------------

/// Render `frames` frames into an interleaved f32 buffer with `channels`
/// channels (mono signal duplicated). Writes silence when the session is not
/// ready, unknown, or being rendered by another thread. Returns the number of
/// frames written.
///
/// # Safety
/// `out` must be null or valid for `frames * channels` writes.
#[no_mangle]
pub unsafe extern "C" fn wavebridge_render(handle: u32, out: *mut f32, frames: u32, channels: u32) -> u32 {
    if out.is_null() || frames == 0 || channels == 0 {
        return 0;
    }
    // SAFETY: caller guarantees `out` covers frames * channels samples
    let out = unsafe { std::slice::from_raw_parts_mut(out, frames as usize * channels as usize) };

    let table = sessions().load();
    let adapter = table.get(&handle).map(|s| s.adapter.try_lock());
    match adapter {
        Some(Ok(mut adapter)) => adapter.fill_interleaved(out, channels as usize),
        _ => out.fill(0.0),
    }
    frames
}
