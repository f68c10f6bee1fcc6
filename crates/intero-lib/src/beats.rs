//! Restricting detected beats to task intervals.

use crate::events::Event;
use crate::signal::Beats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedBeat {
    pub sample: usize,
    /// Index of the first interval (input order) containing the beat.
    pub interval: usize,
}

/// Pair every beat with the first closed interval containing it; beats
/// outside all intervals are dropped.
pub fn assign_beats(beats: &[usize], intervals: &[Event]) -> Vec<AssignedBeat> {
    beats
        .iter()
        .filter_map(|&sample| {
            intervals
                .iter()
                .position(|iv| iv.contains(sample))
                .map(|interval| AssignedBeat { sample, interval })
        })
        .collect()
}

/// Beats falling inside at least one interval, each kept once.
pub fn restrict_beats(beats: &Beats, intervals: &[Event]) -> Beats {
    let kept: Vec<usize> = assign_beats(&beats.indices, intervals)
        .into_iter()
        .map(|b| b.sample)
        .collect();
    log::debug!(
        "kept {}/{} beats inside {} interval(s)",
        kept.len(),
        beats.len(),
        intervals.len()
    );
    Beats::from_indices(kept)
}

/// Number of beats per interval, in interval order.
pub fn beats_per_interval(beats: &[usize], intervals: &[Event]) -> Vec<usize> {
    let mut counts = vec![0; intervals.len()];
    for beat in assign_beats(beats, intervals) {
        counts[beat.interval] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn bounds_are_closed() {
        let intervals = [Event::new(10, 5)];
        let kept = restrict_beats(&Beats::from_indices(vec![9, 10, 12, 15, 16]), &intervals);
        assert_eq!(kept.indices, vec![10, 12, 15]);
    }

    #[test]
    fn overlapping_intervals_keep_beat_once_on_first_match() {
        let intervals = [Event::new(0, 10), Event::new(5, 10)];
        let assigned = assign_beats(&[3, 7, 12], &intervals);
        assert_eq!(
            assigned,
            vec![
                AssignedBeat { sample: 3, interval: 0 },
                AssignedBeat { sample: 7, interval: 0 },
                AssignedBeat { sample: 12, interval: 1 },
            ]
        );
    }

    #[test]
    fn no_intervals_drops_everything() {
        assert!(restrict_beats(&Beats::from_indices(vec![1, 2, 3]), &[]).is_empty());
    }

    #[test]
    fn counts_follow_interval_order() {
        let intervals = [Event::new(0, 10), Event::new(20, 10)];
        assert_eq!(beats_per_interval(&[1, 5, 15, 21, 22, 30, 31], &intervals), vec![2, 3]);
    }

    #[test]
    fn membership_matches_definition_on_random_intervals() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut intervals = Vec::new();
            let mut cursor = rng.gen_range(0..50);
            for _ in 0..rng.gen_range(0..8) {
                let duration = rng.gen_range(1..40);
                intervals.push(Event::new(cursor, duration));
                cursor += duration + rng.gen_range(1..30);
            }
            let mut beats: Vec<usize> = (0..60).map(|_| rng.gen_range(0..cursor + 20)).collect();
            beats.sort_unstable();
            beats.dedup();
            let kept = restrict_beats(&Beats::from_indices(beats.clone()), &intervals);
            for b in beats {
                let inside = intervals
                    .iter()
                    .any(|iv| iv.onset <= b && b <= iv.onset + iv.duration);
                assert_eq!(kept.indices.contains(&b), inside, "beat {b} in {intervals:?}");
            }
        }
    }
}
