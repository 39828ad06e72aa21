//! Parameter automation — time-stamped ramps applied to a single control value.
//!
//! A [`Timeline`] holds an ordered list of [`AutomationEvent`]s and evaluates
//! them the way WebAudio `AudioParam` automation does: a ramp event ends at its
//! own time and starts from the value/time of the previous event.

use std::collections::VecDeque;

/// Smallest value an exponential ramp may start from or target.
pub const MIN_EXPONENTIAL_VALUE: f64 = 1e-4;

/// Ramp shape of a scheduled segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampKind {
    Linear,
    Exponential,
}

/// A single scheduled automation event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationEvent {
    /// Jump to `value` at `time`.
    SetValue { time: f64, value: f64 },
    /// Ramp from the previous event so that `value` is reached at `time`.
    Ramp { kind: RampKind, time: f64, value: f64 },
}

impl AutomationEvent {
    pub fn time(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { time, .. } | AutomationEvent::Ramp { time, .. } => time,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { value, .. } | AutomationEvent::Ramp { value, .. } => value,
        }
    }
}

/// An ordered automation curve for one control value.
#[derive(Debug, Clone)]
pub struct Timeline {
    default_value: f64,
    events: VecDeque<AutomationEvent>,
}

impl Timeline {
    pub fn new(default_value: f64) -> Self {
        Timeline {
            default_value,
            events: VecDeque::new(),
        }
    }

    /// Insert an event, keeping events sorted ascending by time. Events with
    /// equal times keep their scheduling order.
    pub fn insert(&mut self, event: AutomationEvent) {
        let event = match event {
            AutomationEvent::Ramp {
                kind: RampKind::Exponential,
                time,
                value,
            } => AutomationEvent::Ramp {
                kind: RampKind::Exponential,
                time,
                value: value.max(MIN_EXPONENTIAL_VALUE),
            },
            other => other,
        };
        let time = event.time();
        let insert_pos = self
            .events
            .make_contiguous()
            .partition_point(|e| e.time() <= time);
        self.events.insert(insert_pos, event);
    }

    /// Remove all events scheduled at or after `time`.
    pub fn cancel_from(&mut self, time: f64) {
        let keep = self
            .events
            .make_contiguous()
            .partition_point(|e| e.time() < time);
        self.events.truncate(keep);
    }

    /// Drop events that can no longer influence values at or after `time`.
    ///
    /// The last event at or before `time` is kept as the anchor of the
    /// following segment.
    pub fn prune_before(&mut self, time: f64) {
        while self.events.len() >= 2 && self.events[1].time() <= time {
            if let Some(front) = self.events.pop_front() {
                // the anchor value survives as the new default
                self.default_value = front.value();
            }
        }
    }

    /// Evaluate the curve at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        // index of the first event strictly after `time`
        let next_index = self.events.partition_point(|e| e.time() <= time);

        let (start_time, start_value) = if next_index == 0 {
            (0.0, self.default_value)
        } else {
            let prev = &self.events[next_index - 1];
            (prev.time(), prev.value())
        };

        match self.events.get(next_index) {
            Some(AutomationEvent::Ramp { kind, time: end_time, value: end_value }) => {
                let duration = end_time - start_time;
                if duration <= 0.0 {
                    return start_value;
                }
                let progress = ((time - start_time) / duration).clamp(0.0, 1.0);
                interpolate(*kind, start_value, *end_value, progress)
            }
            _ => start_value,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.events.len()
    }
}

fn interpolate(kind: RampKind, from: f64, to: f64, progress: f64) -> f64 {
    match kind {
        RampKind::Linear => from + (to - from) * progress,
        RampKind::Exponential => {
            // an exponential segment can't cross or touch zero; hold instead
            if from <= 0.0 || to <= 0.0 {
                from
            } else {
                from * (to / from).powf(progress)
            }
        }
    }
}
