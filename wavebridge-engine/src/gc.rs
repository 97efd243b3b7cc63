//! RT-safe deferred deallocation for retired modules.
//!
//! Modules are published to the render thread inside `basedrop::Owned`. When
//! the render thread replaces or discards one, dropping the `Owned` only
//! enqueues the pointer; the actual free happens on the `audio-gc` thread.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            // Collector is !Sync; it lives and dies on this thread
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::info!("audio gc thread started");
            loop {
                collector.collect();
                thread::sleep(Duration::from_millis(100));
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            // No collector thread: fall back to a leaked collector so
            // `Owned::new` still works. Retired modules are then never freed.
            log::error!("failed to start audio gc thread; retired modules will leak");
            let collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Handle for wrapping values that may be dropped on the render thread.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
