//! Init handshake: the engine builds the graph node on its own thread and
//! reports back through a one-shot continuation.
//!
//! 1. control registers an `AudioContext` and gets `root`
//! 2. control calls [`Engine::initialize`] with two continuations
//! 3. the engine thread builds the node + render processor, registers the
//!    node, and invokes `on_graph_ready(node)` exactly once
//! 4. control resolves the node and connects it; only then do parameter
//!    calls on the node succeed
//!
//! Continuations are keyed by an opaque token. Invoking a token twice is a
//! programming error: it is logged and rejected, never re-run.

use crate::bridge::RenderBridge;
use crate::channel::control_channel;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{Handle, SharedRegistry};
use crate::runtime::{AudioContext, EngineState, StateSink, WorkletNode, WorkletProcessor};
use crate::stats::RenderStats;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tokio::sync::oneshot;

/// Name the engine gives the node it builds.
pub const PROCESSOR_NAME: &str = "oscillator-processor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContinuationToken(u64);

impl ContinuationToken {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.0)
    }
}

type Continuation<T> = Box<dyn FnOnce(T) + Send>;

/// Table of pending one-shot continuations.
pub struct Continuations<T> {
    next: u64,
    pending: HashMap<u64, Continuation<T>>,
}

impl<T> Default for Continuations<T> {
    fn default() -> Self {
        Self { next: 1, pending: HashMap::new() }
    }
}

impl<T> Continuations<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, f: impl FnOnce(T) + Send + 'static) -> ContinuationToken {
        let token = self.next;
        self.next += 1;
        self.pending.insert(token, Box::new(f));
        ContinuationToken(token)
    }

    /// Remove the continuation so it can be called outside any lock.
    pub fn take(&mut self, token: ContinuationToken) -> BridgeResult<Continuation<T>> {
        self.pending.remove(&token.0).ok_or_else(|| {
            log::error!("continuation {token} invoked twice or never registered");
            BridgeError::ContinuationConsumed(token.0)
        })
    }

    pub fn invoke(&mut self, token: ContinuationToken, value: T) -> BridgeResult<()> {
        let f = self.take(token)?;
        f(value);
        Ok(())
    }

    /// Drop a continuation without calling it.
    pub fn discard(&mut self, token: ContinuationToken) -> bool {
        self.pending.remove(&token.0).is_some()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Engine-side entry points of the handshake.
#[derive(Clone)]
pub struct Engine {
    registry: SharedRegistry,
    config: BridgeConfig,
    graph_ready: Arc<Mutex<Continuations<Handle>>>,
}

impl Engine {
    pub fn new(registry: SharedRegistry, config: BridgeConfig) -> Self {
        Self { registry, config, graph_ready: Arc::new(Mutex::new(Continuations::new())) }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Start building the graph for the context behind `root`. Returns
    /// immediately; `on_graph_ready` fires later on the engine thread.
    pub fn initialize<R, S>(&self, root: Handle, sample_rate: f32, on_graph_ready: R, on_state_message: S) -> ContinuationToken
    where
        R: FnOnce(Handle) + Send + 'static,
        S: FnMut(EngineState) + Send + 'static,
    {
        let token = self.continuations().register(on_graph_ready);
        let engine = self.clone();
        let spawned = thread::Builder::new()
            .name("wavebridge-engine".to_string())
            .spawn(move || engine.build_graph(token, root, sample_rate, Box::new(on_state_message)));
        if let Err(e) = spawned {
            log::error!("failed to spawn engine thread: {e}");
            self.continuations().discard(token);
        }
        token
    }

    /// Invoke the graph-ready continuation for `token`.
    pub fn complete(&self, token: ContinuationToken, node: Handle) -> BridgeResult<()> {
        let f = self.continuations().take(token)?;
        f(node);
        Ok(())
    }

    pub fn pending_handshakes(&self) -> usize {
        self.continuations().pending()
    }

    fn continuations(&self) -> std::sync::MutexGuard<'_, Continuations<Handle>> {
        self.graph_ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_graph(&self, token: ContinuationToken, root: Handle, sample_rate: f32, mut on_state: StateSink) {
        on_state(EngineState::Initializing);

        let context = match self.registry.resolve::<AudioContext>(root) {
            Ok(context) => context,
            Err(e) => {
                log::error!("graph init failed: {e}");
                on_state(EngineState::Failed(e.to_string()));
                self.continuations().discard(token);
                return;
            }
        };

        let stats = Arc::new(RenderStats::new());
        let (port, commands) = control_channel(self.config.control_queue_capacity);
        let bridge = RenderBridge::new(sample_rate, commands, stats.clone());
        let node = Arc::new(WorkletNode::new(PROCESSOR_NAME, &context, port, stats, WorkletProcessor::new(bridge)));

        let handle = self.registry.register(&node);
        node.bind_handle(handle);
        context.adopt(node);
        log::info!("graph ready: {PROCESSOR_NAME} {handle} at {sample_rate} Hz");

        on_state(EngineState::GraphReady);
        context.set_state_sink(on_state);

        if let Err(e) = self.complete(token, handle) {
            log::error!("graph-ready continuation lost: {e}");
        }
    }
}

/// Control-side wrapper: run the handshake and await the node handle.
pub async fn initialize_graph<S>(engine: &Engine, root: Handle, sample_rate: f32, on_state_message: S) -> BridgeResult<Handle>
where
    S: FnMut(EngineState) + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    engine.initialize(
        root,
        sample_rate,
        move |node| {
            let _ = tx.send(node);
        },
        on_state_message,
    );
    rx.await
        .map_err(|_| BridgeError::HandshakeAborted("engine dropped the graph-ready continuation".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn continuation_runs_exactly_once() {
        let mut table = Continuations::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let token = table.register(move |v| {
            assert_eq!(v, 7);
            c.fetch_add(1, Ordering::SeqCst);
        });
        table.invoke(token, 7).unwrap();
        assert!(matches!(table.invoke(token, 7), Err(BridgeError::ContinuationConsumed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn tokens_are_distinct() {
        let mut table = Continuations::<()>::new();
        let a = table.register(|_| {});
        let b = table.register(|_| {});
        assert_ne!(a, b);
        assert!(table.discard(a));
        assert!(!table.discard(a));
    }
}
