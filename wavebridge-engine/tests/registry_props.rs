use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use wavebridge_engine::{AudioContext, BridgeError, HandleRegistry, SharedRegistry};

proptest! {
    #[test]
    fn handles_are_distinct_and_never_reused(n in 1usize..300, drop_every in 1usize..7) {
        let mut reg = HandleRegistry::new();
        let mut seen = HashSet::new();
        let mut keep = Vec::new();
        for i in 0..n {
            let ctx = AudioContext::new(48_000.0);
            let h = reg.register(&ctx);
            prop_assert!(seen.insert(h));
            // some referents die straight away so purges actually run
            if i % drop_every == 0 {
                keep.push((h, ctx));
            }
        }
        for (h, ctx) in &keep {
            prop_assert!(reg.resolve::<AudioContext>(*h).is_ok());
            prop_assert_eq!(reg.handle_of(ctx), Some(*h));
            prop_assert_eq!(reg.register(ctx), *h);
        }
    }
}

#[test]
fn closed_context_handle_dangles() {
    let reg = SharedRegistry::new();
    let ctx = AudioContext::new(44_100.0);
    let h = reg.register(&ctx);
    assert!(reg.is_live(h));
    ctx.close();
    assert!(!reg.is_live(h));
    assert!(matches!(reg.resolve::<AudioContext>(h), Err(BridgeError::UnknownHandle(x)) if x == h));
}

#[test]
fn dropped_object_handle_dangles() {
    let reg = SharedRegistry::new();
    let ctx = AudioContext::new(44_100.0);
    let h = reg.register(&ctx);
    drop(ctx);
    assert!(reg.resolve::<AudioContext>(h).is_err());
    // a new registration never recycles the old number
    let other = AudioContext::new(44_100.0);
    assert_ne!(reg.register(&other), h);
}

#[test]
fn handle_survives_raw_round_trip() {
    let reg = SharedRegistry::new();
    let ctx: Arc<AudioContext> = AudioContext::new(48_000.0);
    let h = reg.register(&ctx);
    let back = wavebridge_engine::Handle::from_raw(h.raw()).unwrap();
    assert!(Arc::ptr_eq(&reg.resolve::<AudioContext>(back).unwrap(), &ctx));
    assert!(wavebridge_engine::Handle::from_raw(0).is_none());
}

#[test]
fn context_registered_twice_shares_a_handle() {
    let reg = SharedRegistry::new();
    let ctx = AudioContext::new(48_000.0);
    let h = reg.register(&ctx);
    assert_eq!(reg.register(&ctx), h);
    assert_eq!(reg.handle_of(&ctx), Some(h));
    ctx.close();
    assert_eq!(reg.handle_of(&ctx), None);
}
