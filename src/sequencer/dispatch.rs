// Decides which channels fire on a given step.
//
// The same resolver runs for live playback (fed from the scheduler's snapshot)
// and for offline rendering (fed from each scene's saved patterns), so both
// paths agree on mute/solo/sample rules.

use serde::{Deserialize, Serialize};

use crate::shared::{ChannelId, PunchIn, Timeline};

// Read-only view of one channel for a single scheduling pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub channel_id: ChannelId,
    pub steps: Vec<bool>,
    pub triplet_steps: Vec<bool>,
    pub muted: bool,
    pub solo: bool,
    pub has_sample: bool,
}

impl ChannelSnapshot {
    // indices past the end of a pattern are rests
    pub fn bit(&self, timeline: Timeline, index: usize) -> bool {
        let grid = match timeline {
            Timeline::Straight => &self.steps,
            Timeline::Triplet => &self.triplet_steps,
        };
        grid.get(index).copied().unwrap_or(false)
    }
}

// One channel firing. `sample_channel` differs from `channel_id` only under swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fired {
    pub channel_id: ChannelId,
    pub sample_channel: ChannelId,
}

// Mute and solo rules. Solo is global: one soloed channel silences every non-solo one.
pub fn is_audible(muted: bool, solo: bool, any_solo: bool) -> bool {
    !muted && (!any_solo || solo)
}

// Resolves the fired set for `index` on `timeline`.
//
// Under `swap`, channel i plays channel (i+1)'s pattern bit and sample while
// keeping its own mute/solo. If that neighbour has no sample the event is
// dropped instead of falling back to channel i's own sample.
pub fn resolve(
    channels: &[ChannelSnapshot],
    timeline: Timeline,
    index: usize,
    punch_in: PunchIn,
) -> Vec<Fired> {
    let any_solo = channels.iter().any(|c| c.solo);
    let n = channels.len();

    channels
        .iter()
        .enumerate()
        .filter(|(_, ch)| is_audible(ch.muted, ch.solo, any_solo))
        .filter_map(|(i, ch)| {
            let source = if punch_in == PunchIn::Swap {
                &channels[(i + 1) % n]
            } else {
                ch
            };
            (source.bit(timeline, index) && source.has_sample).then_some(Fired {
                channel_id: ch.channel_id,
                sample_channel: source.channel_id,
            })
        })
        .collect()
}
