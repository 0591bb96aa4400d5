use chrono::NaiveTime;

use super::{ActivityBlock, ActivitySample};
use crate::grid::codec::SLOT_MINUTES;

/// Collapse a day's samples into contiguous blocks per activity type.
///
/// Samples of one type extend the open block only when they land exactly one slot after its
/// end; anything else starts a new block. Blocks come back ordered by start time, ties keeping
/// the first-seen order of their activity types.
pub fn cluster_samples(samples: &[ActivitySample]) -> Vec<ActivityBlock> {
    let mut sorted: Vec<&ActivitySample> = samples.iter().collect();
    sorted.sort_by_key(|sample| sample.time);

    let mut groups: Vec<(&str, Vec<&ActivitySample>)> = Vec::new();
    for sample in sorted {
        match groups
            .iter_mut()
            .find(|(activity, _)| *activity == sample.activity_type)
        {
            Some((_, members)) => members.push(sample),
            None => groups.push((sample.activity_type.as_str(), vec![sample])),
        }
    }

    let mut blocks = Vec::new();
    for (_, members) in groups {
        let mut current: Option<ActivityBlock> = None;
        for sample in members {
            match current.as_mut() {
                Some(block) if is_next_slot(block.end_time, sample.time) => {
                    block.end_time = sample.time;
                    block.coordinate = sample.coordinate;
                }
                _ => {
                    if let Some(done) = current.take() {
                        blocks.push(done);
                    }
                    current = Some(ActivityBlock {
                        activity_type: sample.activity_type.clone(),
                        start_time: sample.time,
                        end_time: sample.time,
                        coordinate: sample.coordinate,
                    });
                }
            }
        }
        if let Some(done) = current {
            blocks.push(done);
        }
    }

    blocks.sort_by_key(|block| block.start_time);
    blocks
}

fn is_next_slot(end: NaiveTime, next: NaiveTime) -> bool {
    next.signed_duration_since(end).num_seconds() == i64::from(SLOT_MINUTES) * 60
}
