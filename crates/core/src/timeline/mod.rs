//! Declarative animation tracks advanced once per frame.
//!
//! A [`Timeline`] holds tracks sorted by start time. Each frame the clock is
//! advanced and every started track writes its eased value into whatever
//! implements [`Animatable`]. A track without an explicit `from` value reads
//! the property when it starts, so chained tracks on the same property pick up
//! where the previous one left off.

use std::f32::consts::{PI, TAU};

use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    pub time_seconds: f32,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    pub fn advance(&mut self, delta: f32) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }
}

/// Easing curves mapping linear progress `t ∈ [0, 1]` to eased progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    CubicOut,
    SineInOut,
    /// Anticipation: dips below zero before accelerating.
    BackIn { overshoot: f32 },
    /// Overshoots past one before settling.
    BackOut { overshoot: f32 },
    ElasticOut { amplitude: f32, period: f32 },
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) * 0.5
                }
            }
            Easing::CubicOut => 1.0 - (1.0 - t).powi(3),
            Easing::SineInOut => -((PI * t).cos() - 1.0) * 0.5,
            Easing::BackIn { overshoot } => t * t * ((overshoot + 1.0) * t - overshoot),
            Easing::BackOut { overshoot } => {
                let s = t - 1.0;
                s * s * ((overshoot + 1.0) * s + overshoot) + 1.0
            }
            Easing::ElasticOut { amplitude, period } => {
                if t <= 0.0 || t >= 1.0 {
                    return t;
                }
                let amplitude = amplitude.max(1.0);
                let period = period.max(f32::EPSILON);
                let shift = period / TAU * (1.0 / amplitude).asin();
                amplitude * 2f32.powf(-10.0 * t) * ((t - shift) * TAU / period).sin() + 1.0
            }
        }
    }
}

/// Property a track animates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackTarget {
    InstanceScale(usize),
    InstanceRotation(usize),
    InstancePosition(usize),
    CameraPosition,
    CameraTarget,
}

impl TrackTarget {
    pub fn instance(self) -> Option<usize> {
        match self {
            TrackTarget::InstanceScale(i)
            | TrackTarget::InstanceRotation(i)
            | TrackTarget::InstancePosition(i) => Some(i),
            TrackTarget::CameraPosition | TrackTarget::CameraTarget => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackValue {
    Scalar(f32),
    Vector(Vec3),
}

impl TrackValue {
    pub fn lerp(self, to: TrackValue, t: f32) -> TrackValue {
        match (self, to) {
            (TrackValue::Scalar(a), TrackValue::Scalar(b)) => TrackValue::Scalar(a + (b - a) * t),
            (TrackValue::Vector(a), TrackValue::Vector(b)) => TrackValue::Vector(a.lerp(b, t)),
            (_, to) => to,
        }
    }

    pub fn as_scalar(self) -> Option<f32> {
        match self {
            TrackValue::Scalar(v) => Some(v),
            TrackValue::Vector(_) => None,
        }
    }

    pub fn as_vector(self) -> Option<Vec3> {
        match self {
            TrackValue::Vector(v) => Some(v),
            TrackValue::Scalar(_) => None,
        }
    }
}

/// Tracks are grouped so owners can poll or cancel their own choreography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackGroup {
    Entrance,
    Transition,
}

/// Read/write access to the properties tracks animate.
pub trait Animatable {
    /// Current value, or `None` if the target no longer exists.
    fn read(&self, target: TrackTarget) -> Option<TrackValue>;
    fn write(&mut self, target: TrackTarget, value: TrackValue);
}

/// Builder describing a single track relative to "now".
#[derive(Debug, Clone, Copy)]
pub struct TrackSpec {
    pub target: TrackTarget,
    pub group: TrackGroup,
    pub delay: f32,
    pub duration: f32,
    pub easing: Easing,
    pub from: Option<TrackValue>,
    pub to: TrackValue,
}

impl TrackSpec {
    pub fn new(target: TrackTarget, group: TrackGroup, to: TrackValue) -> Self {
        Self {
            target,
            group,
            delay: 0.0,
            duration: 0.0,
            easing: Easing::Linear,
            from: None,
            to,
        }
    }

    pub fn delay(mut self, seconds: f32) -> Self {
        self.delay = seconds.max(0.0);
        self
    }

    pub fn duration(mut self, seconds: f32) -> Self {
        self.duration = seconds.max(0.0);
        self
    }

    pub fn ease(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn from(mut self, value: TrackValue) -> Self {
        self.from = Some(value);
        self
    }
}

#[derive(Debug, Clone)]
struct Track {
    spec: TrackSpec,
    start: f32,
    from: Option<TrackValue>,
}

impl Track {
    fn end(&self) -> f32 {
        self.start + self.spec.duration
    }
}

/// One step of a multi-step sequence on a single property.
#[derive(Debug, Clone, Copy)]
pub struct Keyframe {
    pub to: TrackValue,
    pub duration: f32,
    pub easing: Easing,
}

impl Keyframe {
    pub fn new(to: TrackValue, duration: f32, easing: Easing) -> Self {
        Self {
            to,
            duration,
            easing,
        }
    }
}

#[derive(Debug, Default)]
pub struct Timeline {
    clock: PlaybackClock,
    tracks: Vec<Track>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f32 {
        self.clock.time_seconds
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn has_group(&self, group: TrackGroup) -> bool {
        self.tracks.iter().any(|t| t.spec.group == group)
    }

    pub fn has_target(&self, target: TrackTarget) -> bool {
        self.tracks.iter().any(|t| t.spec.target == target)
    }

    /// Schedules a track starting `spec.delay` seconds from now.
    pub fn schedule(&mut self, spec: TrackSpec) {
        let track = Track {
            start: self.now() + spec.delay,
            from: spec.from,
            spec,
        };
        // Stable insertion keeps scheduling order for equal start times.
        let index = self.tracks.partition_point(|t| t.start <= track.start);
        self.tracks.insert(index, track);
    }

    /// Schedules consecutive keyframes on one property, the first starting
    /// after `delay`. Returns the sequence's total length including the delay.
    pub fn schedule_sequence(
        &mut self,
        target: TrackTarget,
        group: TrackGroup,
        delay: f32,
        keyframes: &[Keyframe],
    ) -> f32 {
        let mut offset = delay.max(0.0);
        for key in keyframes {
            self.schedule(
                TrackSpec::new(target, group, key.to)
                    .delay(offset)
                    .duration(key.duration)
                    .ease(key.easing),
            );
            offset += key.duration.max(0.0);
        }
        offset
    }

    /// Drops every track matching `predicate`; returns how many were removed.
    pub fn cancel_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(TrackTarget, TrackGroup) -> bool,
    {
        let before = self.tracks.len();
        self.tracks
            .retain(|t| !predicate(t.spec.target, t.spec.group));
        before - self.tracks.len()
    }

    pub fn cancel_group(&mut self, group: TrackGroup) -> usize {
        self.cancel_where(|_, g| g == group)
    }

    /// Cancels every per-instance track regardless of group.
    pub fn cancel_instances(&mut self) -> usize {
        self.cancel_where(|target, _| target.instance().is_some())
    }

    /// Advances the clock and writes every started track into `scene`.
    /// Finished tracks write their final value and are removed.
    pub fn advance<A: Animatable + ?Sized>(&mut self, delta: f32, scene: &mut A) {
        self.clock.advance(delta);
        let now = self.now();

        let mut index = 0;
        while index < self.tracks.len() {
            let track = &mut self.tracks[index];
            if track.start > now {
                // Sorted by start: nothing later has begun either.
                break;
            }

            let from = match track.from {
                Some(from) => from,
                None => match scene.read(track.spec.target) {
                    Some(current) => {
                        track.from = Some(current);
                        current
                    }
                    None => {
                        self.tracks.remove(index);
                        continue;
                    }
                },
            };

            let finished = now >= track.end();
            let progress = if track.spec.duration <= 0.0 || finished {
                1.0
            } else {
                (now - track.start) / track.spec.duration
            };
            let eased = if finished {
                1.0
            } else {
                track.spec.easing.apply(progress)
            };
            scene.write(track.spec.target, from.lerp(track.spec.to, eased));

            if finished {
                self.tracks.remove(index);
            } else {
                index += 1;
            }
        }
    }
}
