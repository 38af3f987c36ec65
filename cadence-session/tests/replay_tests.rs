//! Property test: folding a session's event log in order reconstructs the
//! same state as live execution, regardless of the deltas' shapes.

use cadence_core::{Event, Session};
use proptest::prelude::*;
use serde_json::json;

fn arb_value() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        any::<bool>().prop_map(|b| json!(b)),
        "[a-z]{0,8}".prop_map(|s| json!(s)),
        proptest::collection::vec(any::<i64>(), 0..4).prop_map(|v| json!(v)),
    ]
}

fn arb_delta() -> impl Strategy<Value = Vec<(String, serde_json::Value)>> {
    proptest::collection::vec(("[a-z]{1,6}", arb_value()), 0..4)
}

proptest! {
    #[test]
    fn replay_matches_live_state(deltas in proptest::collection::vec(arb_delta(), 0..16)) {
        let session = Session::new("app", "user", "s1");
        for delta in &deltas {
            let mut event = Event::new("inv-prop", "agent");
            for (key, value) in delta {
                event.actions.state_delta.insert(key.clone(), value.clone());
            }
            session.append_event(&event);
        }

        let replayed = Session::replay_state(&session.events());
        prop_assert_eq!(replayed, session.state());
    }
}
