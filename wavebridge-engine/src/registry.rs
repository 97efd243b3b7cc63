//! Handle registry: integer handles for native objects that cross the
//! control/engine boundary.
//!
//! The registry never owns anything. It keeps weak references, so a handle
//! stays resolvable only while the runtime keeps the object alive *and* the
//! object reports itself alive (a node whose context was closed is dead even
//! if someone still holds an `Arc` to it). Handles come from a monotonic
//! counter and are never reused.
//!
//! The mapping goes both ways: an address index gives back the handle an
//! object already has, so registering the same `Arc` twice yields one handle.

use crate::error::{BridgeError, BridgeResult};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Opaque, non-zero integer reference to a registered native object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(NonZeroU64);

impl Handle {
    #[inline] pub fn raw(self) -> u64 { self.0.get() }
    #[inline] pub fn from_raw(raw: u64) -> Option<Self> { NonZeroU64::new(raw).map(Self) }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything the runtime hands out handles for.
pub trait Native: Any + Send + Sync {
    /// Short type tag used in log lines.
    fn kind(&self) -> &'static str;

    /// `false` once the owning graph has been torn down.
    fn is_alive(&self) -> bool {
        true
    }
}

struct Entry {
    native: Weak<dyn Native>,
    any: Weak<dyn Any + Send + Sync>,
}

const MIN_PURGE_AT: usize = 64;

pub struct HandleRegistry {
    next: u64,
    entries: HashMap<Handle, Entry>,
    // allocation address -> handle; the stored Weak pins the address
    by_addr: HashMap<usize, Handle>,
    purge_at: usize,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self { next: 1, entries: HashMap::new(), by_addr: HashMap::new(), purge_at: MIN_PURGE_AT }
    }
}

#[inline]
fn addr_of<T>(object: &Arc<T>) -> usize {
    Arc::as_ptr(object).cast::<()>() as usize
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `object`: its existing one if it is already registered,
    /// otherwise a fresh one.
    pub fn register<T: Native>(&mut self, object: &Arc<T>) -> Handle {
        if let Some(handle) = self.existing(object) {
            return handle;
        }
        if self.entries.len() >= self.purge_at {
            self.purge();
        }
        // u64 counter: exhausting it is not a practical concern
        let handle = Handle(NonZeroU64::new(self.next).unwrap_or(NonZeroU64::MIN));
        self.next += 1;

        let native: Weak<dyn Native> = Arc::downgrade(object) as Weak<dyn Native>;
        let any: Weak<dyn Any + Send + Sync> = Arc::downgrade(object) as Weak<dyn Any + Send + Sync>;
        self.entries.insert(handle, Entry { native, any });
        self.by_addr.insert(addr_of(object), handle);
        log::trace!("registered {} as {handle}", object.kind());
        handle
    }

    fn existing<T: Native>(&self, object: &Arc<T>) -> Option<Handle> {
        let handle = *self.by_addr.get(&addr_of(object))?;
        let entry = self.entries.get(&handle)?;
        (entry.native.strong_count() > 0).then_some(handle)
    }

    /// Reverse lookup: the handle `object` was registered under, if it is
    /// still live.
    pub fn handle_of<T: Native>(&self, object: &Arc<T>) -> Option<Handle> {
        self.existing(object).filter(|&h| self.is_live(h))
    }

    /// Resolve `handle` to a live object of type `T`.
    pub fn resolve<T: Native>(&self, handle: Handle) -> BridgeResult<Arc<T>> {
        let entry = self.entries.get(&handle).ok_or(BridgeError::UnknownHandle(handle))?;
        let alive = entry.native.upgrade().is_some_and(|n| n.is_alive());
        if !alive {
            return Err(BridgeError::UnknownHandle(handle));
        }
        entry
            .any
            .upgrade()
            .and_then(|a| a.downcast::<T>().ok())
            .ok_or(BridgeError::UnknownHandle(handle))
    }

    /// Whether `handle` currently resolves to a live object of any type.
    pub fn is_live(&self, handle: Handle) -> bool {
        self.entries
            .get(&handle)
            .and_then(|e| e.native.upgrade())
            .is_some_and(|n| n.is_alive())
    }

    /// Entries whose referent still exists (may include torn-down objects).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.native.strong_count() > 0);
        let entries = &self.entries;
        self.by_addr.retain(|_, h| entries.contains_key(h));
        self.purge_at = (self.entries.len() * 2).max(MIN_PURGE_AT);
        log::trace!("purged {} dead handles", before - self.entries.len());
    }
}

/// Registry shared between the control thread and the engine init thread.
/// The render thread never touches it.
#[derive(Clone, Default)]
pub struct SharedRegistry(Arc<RwLock<HandleRegistry>>);

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Native>(&self, object: &Arc<T>) -> Handle {
        self.0.write().unwrap_or_else(PoisonError::into_inner).register(object)
    }

    pub fn resolve<T: Native>(&self, handle: Handle) -> BridgeResult<Arc<T>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).resolve(handle)
    }

    pub fn handle_of<T: Native>(&self, object: &Arc<T>) -> Option<Handle> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).handle_of(object)
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).is_live(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Thing {
        alive: AtomicBool,
    }
    impl Native for Thing {
        fn kind(&self) -> &'static str { "thing" }
        fn is_alive(&self) -> bool { self.alive.load(Ordering::Acquire) }
    }

    struct Other;
    impl Native for Other {
        fn kind(&self) -> &'static str { "other" }
    }

    fn thing() -> Arc<Thing> {
        Arc::new(Thing { alive: AtomicBool::new(true) })
    }

    #[test]
    fn resolves_registered_object() {
        let mut reg = HandleRegistry::new();
        let t = thing();
        let h = reg.register(&t);
        assert!(Arc::ptr_eq(&reg.resolve::<Thing>(h).unwrap(), &t));
    }

    #[test]
    fn dropped_referent_is_unknown() {
        let mut reg = HandleRegistry::new();
        let t = thing();
        let h = reg.register(&t);
        drop(t);
        assert!(matches!(reg.resolve::<Thing>(h), Err(BridgeError::UnknownHandle(x)) if x == h));
        assert!(!reg.is_live(h));
    }

    #[test]
    fn torn_down_referent_is_unknown_even_if_held() {
        let mut reg = HandleRegistry::new();
        let t = thing();
        let h = reg.register(&t);
        t.alive.store(false, Ordering::Release);
        assert!(reg.resolve::<Thing>(h).is_err());
    }

    #[test]
    fn never_issued_and_wrong_kind_fail() {
        let mut reg = HandleRegistry::new();
        let o = Arc::new(Other);
        let h = reg.register(&o);
        assert!(reg.resolve::<Thing>(h).is_err());
        assert!(reg.resolve::<Other>(h).is_ok());
        let bogus = Handle::from_raw(h.raw() + 100).unwrap();
        assert!(reg.resolve::<Other>(bogus).is_err());
    }

    #[test]
    fn same_object_keeps_one_handle() {
        let mut reg = HandleRegistry::new();
        let t = thing();
        let h = reg.register(&t);
        assert_eq!(reg.register(&t.clone()), h);
        assert_eq!(reg.handle_of(&t), Some(h));
        assert_eq!(reg.len(), 1);

        let u = thing();
        assert_eq!(reg.handle_of(&u), None);
        assert_ne!(reg.register(&u), h);
    }

    #[test]
    fn reverse_lookup_follows_liveness() {
        let mut reg = HandleRegistry::new();
        let t = thing();
        let h = reg.register(&t);
        t.alive.store(false, Ordering::Release);
        assert_eq!(reg.handle_of(&t), None);
        // still the same object, so still the same (dead) handle
        assert_eq!(reg.register(&t), h);
    }

    #[test]
    fn purged_address_gets_a_fresh_handle() {
        let mut reg = HandleRegistry::new();
        let first = {
            let t = thing();
            reg.register(&t)
        };
        reg.purge();
        assert!(reg.by_addr.is_empty());
        // the allocator may hand the same address back; the handle must differ
        let t = thing();
        let h = reg.register(&t);
        assert_ne!(h, first);
        assert_eq!(reg.handle_of(&t), Some(h));
    }

    #[test]
    fn handles_are_not_reused_after_purge() {
        let mut reg = HandleRegistry::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let t = thing();
            assert!(seen.insert(reg.register(&t)));
        }
        // every referent was dropped right away, so purges kept the table small
        assert!(reg.len() <= MIN_PURGE_AT);
    }
}
