//! Randomized update storms. Whatever order records arrive in, the
//! engine must keep its invariants: lock restored after every batch, map
//! keys equal to entity ids, flushes ordered and deduplicated.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::entity::EntityId;
use crate::event::{ChangeEvent, EventSink};
use crate::manager::{StateManager, UpdatePolicy};
use crate::service::UpdateRecord;
use crate::state::{State, StateNode};

/// Sink that asserts batch discipline on every delivery.
#[derive(Default)]
struct AssertingSink {
    delivered: Mutex<usize>,
}

impl EventSink for AssertingSink {
    fn deliver(&self, _state: &State, events: &[ChangeEvent]) {
        // ordered by action weight
        let weights: Vec<u8> = events.iter().map(|e| e.action.weight()).collect();
        let mut sorted = weights.clone();
        sorted.sort_unstable();
        assert_eq!(weights, sorted, "flush out of order");

        // one delivery per (name, id)
        let mut seen = HashSet::new();
        for event in events {
            assert!(
                seen.insert((event.name.clone(), event.id.clone())),
                "duplicate delivery of {}",
                event.name
            );
        }
        *self.delivered.lock().unwrap() += events.len();
    }
}

fn random_record(rng: &mut fastrand::Rng, live: &[i64]) -> UpdateRecord {
    let id = live[rng.usize(..live.len())];
    match rng.u8(..10) {
        0..=5 => UpdateRecord::update(
            "cm",
            json!({"id": id, "name": format!("cm-{}", rng.u16(..)), "visible": rng.bool()}),
        ),
        6..=7 => UpdateRecord::update("section", json!({"id": 10, "collapsed": rng.bool()})),
        _ => UpdateRecord::update("cm", json!({"id": id, "indent": rng.u8(..4)})),
    }
}

#[test]
fn update_storms_keep_every_invariant() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let sink = Arc::new(AssertingSink::default());
    let mut manager = StateManager::new(Arc::clone(&sink) as Arc<dyn EventSink>);

    let live: Vec<i64> = (1..=20).collect();
    let cms: Vec<_> = live
        .iter()
        .map(|id| json!({"id": id, "name": format!("cm-{id}"), "visible": true}))
        .collect();
    manager
        .set_initial_state(json!({
            "course": {"id": 1, "name": "storm"},
            "section": [{"id": 10, "name": "S1"}],
            "cm": cms,
        }))
        .unwrap();

    for _ in 0..200 {
        let batch: Vec<UpdateRecord> = (0..rng.usize(1..8))
            .map(|_| random_record(&mut rng, &live))
            .collect();
        manager
            .process_updates(batch, &UpdatePolicy::strict())
            .unwrap();
        assert!(manager.is_locked(), "lock dropped between batches");

        // key/id agreement over the whole collection
        match manager.state().get("cm").unwrap() {
            StateNode::Collection(map) => {
                for (expected, entity) in map.ids().zip(map.values()) {
                    assert_eq!(entity.id().as_ref(), Some(expected));
                }
            }
            StateNode::Scalar(_) => panic!("cm degraded to a scalar"),
        }
    }

    assert!(*sink.delivered.lock().unwrap() > 0, "storm produced no events");
}

#[test]
fn interleaved_creates_updates_and_deletes_converge() {
    let mut rng = fastrand::Rng::with_seed(0xbee5);
    let sink = Arc::new(AssertingSink::default());
    let mut manager = StateManager::new(Arc::clone(&sink) as Arc<dyn EventSink>);
    manager
        .set_initial_state(json!({
            "course": {"id": 1, "name": "churn"},
            "cm": [],
        }))
        .unwrap();

    let mut present: HashSet<i64> = HashSet::new();
    for round in 0..300 {
        let id = rng.i64(1..40);
        let record = if present.contains(&id) && rng.bool() {
            present.remove(&id);
            UpdateRecord::delete("cm", json!({"id": id}))
        } else {
            present.insert(id);
            UpdateRecord::update("cm", json!({"id": id, "round": round}))
        };
        manager
            .process_updates(vec![record], &UpdatePolicy::upsert())
            .unwrap();
    }

    let map = manager.state().collection("cm").unwrap();
    assert_eq!(map.len(), present.len());
    for id in &present {
        assert!(map.contains(&EntityId::Num(*id)), "cm[{id}] lost");
    }
}
