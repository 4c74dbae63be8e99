// Look-ahead scheduler. Turns tempo, swing, patterns and punch-in effects into
// trigger events with a delay relative to "now". Callers pass the current time
// in milliseconds; the timing thread owns the only clock.
//
// Event times are accumulated (`next += duration`) rather than re-derived from
// the tick count, so late ticks only eat into the look-ahead window.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerSettings;
use crate::sequencer::dispatch::{resolve, ChannelSnapshot};
use crate::sequencer::timing::{effective_index, swing_offset_ms, Durations};
use crate::shared::{
    clamp_bpm, clamp_swing, quantize_repeat_origin, snap_step_count, triplet_count, ChannelId,
    PunchIn, StepPosition, Timeline, DEFAULT_BPM, DEFAULT_STEP_COUNT,
};

// Everything the scheduler needs from the host, pushed whenever it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulerUpdate {
    pub bpm: f64,
    pub step_count: usize,
    pub swing: f64,
    pub punch_in: PunchIn,
    // None while repeating means "capture it from the current step"
    pub repeat_origin: Option<usize>,
    pub channels: Vec<ChannelSnapshot>,
}

impl Default for SchedulerUpdate {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            step_count: DEFAULT_STEP_COUNT,
            swing: 0.0,
            punch_in: PunchIn::None,
            repeat_origin: None,
            channels: Vec::new(),
        }
    }
}

impl SchedulerUpdate {
    fn clamped(mut self) -> Self {
        self.bpm = clamp_bpm(self.bpm);
        self.swing = clamp_swing(self.swing);
        self.step_count = snap_step_count(self.step_count);
        self
    }
}

// Instruction to play a channel `delay_ms` after the tick that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub channel_id: ChannelId,
    pub sample_channel: ChannelId, // whose sample sounds; differs under swap
    pub delay_ms: f64,
    pub step: usize, // pattern slot heard, after the repeat fold
    pub is_triplet: bool,
}

// What one tick produced. Triggers are delivered as a single batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickOutput {
    pub triggers: Vec<TriggerEvent>,
    pub step: Option<StepPosition>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Stopped,
    Running,
}

// Per-timeline phase accumulator.
#[derive(Clone, Copy, Debug, Default)]
struct Lane {
    index: usize,      // next index to schedule
    next_time: f64,    // absolute time of that index, unswung
    last_time: Option<f64>,
    last_due: Option<f64>, // when the last event actually plays, swing included
    last_index: usize, // most recently scheduled index, shown to the UI
}

impl Lane {
    fn reset(&mut self, now: f64) {
        *self = Lane { next_time: now, ..Lane::default() };
    }

    // `swing` is the offset the next index will get at the new cadence
    fn rebase(&mut self, now: f64, duration: f64, swing: f64) {
        let mut next = match self.last_time {
            Some(last) => (last + duration).max(now),
            None => now,
        };
        // a swung offbeat may already sit past `last + duration`
        if let Some(due) = self.last_due {
            next = next.max(due - swing);
        }
        self.next_time = next;
    }

    fn wrap(&mut self, len: usize) {
        self.index %= len;
        self.last_index %= len;
    }
}

pub struct Scheduler {
    settings: SchedulerSettings,
    config: SchedulerUpdate,
    state: RunState,
    repeat_origin: usize,
    straight: Lane,
    triplet: Lane,
    last_ui_emit: f64,
    last_ui_pos: Option<StepPosition>,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings, config: SchedulerUpdate) -> Self {
        Self {
            settings,
            config: config.clamped(),
            state: RunState::Stopped,
            repeat_origin: 0,
            straight: Lane::default(),
            triplet: Lane::default(),
            last_ui_emit: 0.0,
            last_ui_pos: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn config(&self) -> &SchedulerUpdate {
        &self.config
    }

    pub fn position(&self) -> StepPosition {
        StepPosition {
            current_step: self.straight.last_index,
            current_triplet_step: self.triplet.last_index,
        }
    }

    // Resets both timelines to `now` and starts running.
    pub fn start(&mut self, now: f64) -> StepPosition {
        self.straight.reset(now);
        self.triplet.reset(now);
        self.state = RunState::Running;
        self.last_ui_emit = now;
        self.last_ui_pos = Some(StepPosition::default());
        debug!("scheduler started at {now:.1}ms, bpm {}", self.config.bpm);
        StepPosition::default()
    }

    // Idempotent. Already-emitted triggers are not recalled.
    pub fn stop(&mut self) -> StepPosition {
        if self.state == RunState::Running {
            debug!("scheduler stopped");
        }
        self.state = RunState::Stopped;
        self.straight = Lane::default();
        self.triplet = Lane::default();
        self.last_ui_pos = None;
        StepPosition::default()
    }

    // Applies a live edit. Counters keep running; only future durations change.
    pub fn update(&mut self, update: SchedulerUpdate, now: f64) {
        let update = update.clamped();
        let old = Durations::new(self.config.bpm, self.config.punch_in);
        let new = Durations::new(update.bpm, update.punch_in);

        if update.punch_in == PunchIn::Repeat {
            self.repeat_origin = match update.repeat_origin {
                Some(origin) => quantize_repeat_origin(origin),
                None if self.config.punch_in != PunchIn::Repeat => {
                    quantize_repeat_origin(self.straight.index)
                }
                None => self.repeat_origin,
            };
        }

        if update.step_count != self.config.step_count {
            self.straight.wrap(update.step_count);
            self.triplet.wrap(triplet_count(update.step_count));
        }

        if self.is_running() && old != new {
            // avoid a gap (or a burst) at the old cadence
            let swing = swing_offset_ms(self.straight.index, update.swing, new.step_ms);
            self.straight.rebase(now, new.step_ms, swing);
            self.triplet.rebase(now, new.triplet_ms, 0.0);
        }

        debug!(
            "scheduler update: bpm {}, {} steps, swing {}, punch-in {}",
            update.bpm,
            update.step_count,
            update.swing,
            update.punch_in.label()
        );
        self.config = update;
    }

    // Emits every event due before `now + lookahead`.
    pub fn tick(&mut self, now: f64) -> TickOutput {
        if !self.is_running() {
            return TickOutput::default();
        }
        let durations = Durations::new(self.config.bpm, self.config.punch_in);
        let horizon = now + self.settings.lookahead_ms;
        let step_count = self.config.step_count;

        let mut triggers = Vec::new();
        self.drain_lane(Timeline::Straight, durations.step_ms, step_count, now, horizon, &mut triggers);
        self.drain_lane(
            Timeline::Triplet,
            durations.triplet_ms,
            triplet_count(step_count),
            now,
            horizon,
            &mut triggers,
        );

        TickOutput { triggers, step: self.throttled_position(now) }
    }

    fn drain_lane(
        &mut self,
        timeline: Timeline,
        duration: f64,
        len: usize,
        now: f64,
        horizon: f64,
        out: &mut Vec<TriggerEvent>,
    ) {
        let cfg = &self.config;
        let lane = match timeline {
            Timeline::Straight => &mut self.straight,
            Timeline::Triplet => &mut self.triplet,
        };

        // A stalled thread would otherwise flush every missed step at once.
        let late = now - lane.next_time;
        if late > self.settings.lookahead_ms {
            let missed = (late / duration).floor() as usize;
            warn!("{timeline:?} timeline {late:.0}ms late, skipping {missed} steps");
            lane.next_time += missed as f64 * duration;
            lane.index = (lane.index + missed) % len;
        }

        while lane.next_time < horizon {
            let slot = effective_index(lane.index, timeline, cfg.punch_in, self.repeat_origin, len);
            let swing = match timeline {
                Timeline::Straight => swing_offset_ms(lane.index, cfg.swing, duration),
                Timeline::Triplet => 0.0,
            };
            let mut due = (lane.next_time + swing).max(now);
            if let Some(last) = lane.last_due {
                due = due.max(last);
            }
            let delay_ms = due - now;
            out.extend(resolve(&cfg.channels, timeline, slot, cfg.punch_in).into_iter().map(
                |f| TriggerEvent {
                    channel_id: f.channel_id,
                    sample_channel: f.sample_channel,
                    delay_ms,
                    step: slot,
                    is_triplet: timeline == Timeline::Triplet,
                },
            ));
            lane.last_time = Some(lane.next_time);
            lane.last_due = Some(due);
            lane.last_index = lane.index;
            lane.next_time += duration;
            lane.index = (lane.index + 1) % len;
        }
    }

    // UI updates are rate-limited separately from audio so redraw cost can't perturb timing
    fn throttled_position(&mut self, now: f64) -> Option<StepPosition> {
        if now - self.last_ui_emit < self.settings.ui_throttle_ms {
            return None;
        }
        let pos = self.position();
        if self.last_ui_pos == Some(pos) {
            return None;
        }
        self.last_ui_emit = now;
        self.last_ui_pos = Some(pos);
        Some(pos)
    }
}
