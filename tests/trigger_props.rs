use proptest::prelude::*;
use std::collections::BTreeSet;

use presence_trigger::{filter, BoundingBox, CategorySet, Detection, Edge, EdgeTrigger};

fn detection_strategy() -> impl Strategy<Value = Detection> {
    (1u32..91, 0.0f32..=1.0f32).prop_map(|(class_id, confidence)| Detection {
        class_id,
        confidence,
        bbox: BoundingBox::new(0.1, 0.1, 0.5, 0.5),
    })
}

proptest! {
    #[test]
    fn signals_match_rising_transitions(inputs in prop::collection::vec(any::<bool>(), 0..200)) {
        let mut trigger = EdgeTrigger::new();
        let signals: Vec<usize> = inputs
            .iter()
            .enumerate()
            .filter_map(|(i, &present)| trigger.update(present).and_then(Edge::signal).map(|_| i))
            .collect();

        // A rising transition is a present frame whose predecessor (or the
        // virtual frame before the first) was absent.
        let expected: Vec<usize> = (0..inputs.len())
            .filter(|&i| inputs[i] && (i == 0 || !inputs[i - 1]))
            .collect();
        prop_assert_eq!(signals, expected);
    }

    #[test]
    fn state_tracks_last_input(inputs in prop::collection::vec(any::<bool>(), 1..100)) {
        let mut trigger = EdgeTrigger::new();
        for &present in &inputs {
            trigger.update(present);
        }
        let last = *inputs.last().unwrap();
        prop_assert_eq!(trigger.state() == presence_trigger::PresenceState::Present, last);
    }

    #[test]
    fn filter_is_order_independent(
        detections in prop::collection::vec(detection_strategy(), 0..50),
        threshold in 0.0f32..=1.0f32,
    ) {
        let categories = CategorySet::default();
        let forward = filter(&detections, &categories, threshold);
        let mut reversed = detections.clone();
        reversed.reverse();
        prop_assert_eq!(&forward, &filter(&reversed, &categories, threshold));

        let expected: BTreeSet<u32> = detections
            .iter()
            .filter(|d| d.confidence >= threshold && categories.contains(d.class_id))
            .map(|d| d.class_id)
            .collect();
        prop_assert_eq!(forward, expected);
    }
}
