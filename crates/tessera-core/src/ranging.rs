//! Ranged beacon deduplication
//!
//! A ranging batch can report the same physical beacon several times. This
//! module collapses a batch to one observation per `(uuid, major, minor)`
//! key, preferring the most accurate usable estimate. Pure and stateless
//! per batch.

use std::collections::{hash_map::Entry, HashMap};

use crate::types::BeaconObservation;

/// Deduplicate a ranging batch.
///
/// For each beacon key exactly one entry survives: the lowest non-negative
/// accuracy when one exists, otherwise the first negative-accuracy sighting
/// (negative means the platform produced no usable estimate). The result is
/// sorted by accuracy ascending.
pub fn dedupe_observations(batch: &[BeaconObservation]) -> Vec<BeaconObservation> {
    let mut best: HashMap<_, BeaconObservation> = HashMap::with_capacity(batch.len());

    for observation in batch {
        match best.entry(observation.dedup_key()) {
            Entry::Vacant(slot) => {
                slot.insert(observation.clone());
            }
            Entry::Occupied(mut slot) => {
                if prefer(observation, slot.get()) {
                    slot.insert(observation.clone());
                }
            }
        }
    }

    let mut deduped: Vec<_> = best.into_values().collect();
    deduped.sort_by(|a, b| a.accuracy.total_cmp(&b.accuracy));
    deduped
}

/// Whether `candidate` should replace `incumbent` for the same beacon.
fn prefer(candidate: &BeaconObservation, incumbent: &BeaconObservation) -> bool {
    match (candidate.accuracy >= 0.0, incumbent.accuracy >= 0.0) {
        // A usable estimate always beats an unusable one.
        (true, false) => true,
        (false, true) => false,
        (true, true) => candidate.accuracy < incumbent.accuracy,
        (false, false) => false,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Proximity;
    use uuid::Uuid;

    fn observation(major: u16, minor: u16, accuracy: f64) -> BeaconObservation {
        BeaconObservation {
            uuid: Uuid::parse_str("f7826da6-4fa2-4e98-8024-bc5b71e0893e").unwrap(),
            major,
            minor,
            rssi: -60,
            accuracy,
            proximity: Proximity::Near,
        }
    }

    #[test]
    fn empty_batch_stays_empty() {
        assert!(dedupe_observations(&[]).is_empty());
    }

    #[test]
    fn keeps_lowest_nonnegative_accuracy_per_key() {
        let batch = vec![
            observation(1, 1, 3.2),
            observation(1, 1, 0.8),
            observation(1, 1, 1.5),
        ];
        let deduped = dedupe_observations(&batch);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].accuracy, 0.8);
    }

    #[test]
    fn usable_estimate_beats_negative_regardless_of_order() {
        let batch = vec![observation(1, 1, -1.0), observation(1, 1, 4.0)];
        let deduped = dedupe_observations(&batch);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].accuracy, 4.0);

        let batch = vec![observation(1, 1, 4.0), observation(1, 1, -1.0)];
        let deduped = dedupe_observations(&batch);
        assert_eq!(deduped[0].accuracy, 4.0);
    }

    #[test]
    fn negative_survives_only_alone() {
        let batch = vec![observation(1, 1, -1.0), observation(1, 1, -2.0)];
        let deduped = dedupe_observations(&batch);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].accuracy, -1.0);
    }

    #[test]
    fn distinct_keys_all_survive_sorted_by_accuracy() {
        let batch = vec![
            observation(2, 1, 5.0),
            observation(1, 1, 0.4),
            observation(1, 2, 2.2),
            observation(1, 2, 9.0),
        ];
        let deduped = dedupe_observations(&batch);
        assert_eq!(deduped.len(), 3);
        let accuracies: Vec<f64> = deduped.iter().map(|o| o.accuracy).collect();
        assert_eq!(accuracies, vec![0.4, 2.2, 5.0]);
    }

    #[test]
    fn minor_distinguishes_beacons() {
        let batch = vec![observation(1, 1, 1.0), observation(1, 2, 1.0)];
        assert_eq!(dedupe_observations(&batch).len(), 2);
    }
}
