//! Aggregate ↔ focused view state machine.
//!
//! Entering focus picks the visible bean nearest the screen centre as the
//! hero, collapses everything else in a shuffled stagger and flies the camera
//! in. Exiting reverses it: the hero is handed new drift parameters and the
//! rest of the population pops back in around it.

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::{
    field::ParticleField,
    halo::HaloState,
    scene::Camera,
    timeline::{Easing, Keyframe, Timeline, TrackGroup, TrackSpec, TrackTarget, TrackValue},
};

const COLLAPSE_OVERSHOOT: f32 = 1.3;
const REVEAL_OVERSHOOT: f32 = 1.4;
/// Share of the window the non-hero stagger may spread across.
const STAGGER_WINDOW: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModeConfig {
    /// Externally reflected toggle; reverted when a request is rejected.
    pub single_bean_mode: bool,
    pub transition_duration: f32,
    /// Radians of hero rotation per pixel dragged.
    pub drag_sensitivity: f32,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            single_bean_mode: false,
            transition_duration: 1.2,
            drag_sensitivity: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeState {
    #[default]
    Aggregate,
    EnteringFocus,
    Focused,
    ExitingFocus,
}

impl ModeState {
    pub fn is_transitioning(self) -> bool {
        matches!(self, ModeState::EnteringFocus | ModeState::ExitingFocus)
    }

    /// Value the external single-bean toggle should show in this state.
    pub fn wants_focus(self) -> bool {
        matches!(self, ModeState::EnteringFocus | ModeState::Focused)
    }
}

/// Outcome of a mode-change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeRequest {
    /// A transition began; carries the new state.
    Started(ModeState),
    /// Already in the requested mode.
    Unchanged,
    /// Dropped: mid-transition, or nothing visible to focus on.
    Rejected,
}

/// Everything a transition mutates, borrowed for the duration of a request.
pub struct TransitionParts<'a> {
    pub field: &'a mut ParticleField,
    pub camera: &'a Camera,
    pub timeline: &'a mut Timeline,
    pub halo: &'a mut HaloState,
    pub config: &'a ModeConfig,
}

#[derive(Debug, Default)]
pub struct TransitionController {
    state: ModeState,
    hero: Option<usize>,
}

impl TransitionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ModeState {
        self.state
    }

    pub fn hero(&self) -> Option<usize> {
        self.hero
    }

    pub fn is_transitioning(&self) -> bool {
        self.state.is_transitioning()
    }

    pub fn request(&mut self, focus: bool, parts: TransitionParts<'_>) -> ModeRequest {
        if self.is_transitioning() {
            tracing::debug!(state = ?self.state, focus, "mode request dropped mid-transition");
            return ModeRequest::Rejected;
        }
        match (self.state, focus) {
            (ModeState::Aggregate, true) => self.enter_focus(parts),
            (ModeState::Focused, false) => self.exit_focus(parts),
            _ => ModeRequest::Unchanged,
        }
    }

    /// Polls the timeline and settles the state once choreography finishes.
    pub fn update(&mut self, timeline: &Timeline) {
        if timeline.has_group(TrackGroup::Transition) {
            return;
        }
        let settled = match self.state {
            ModeState::EnteringFocus => ModeState::Focused,
            ModeState::ExitingFocus => ModeState::Aggregate,
            other => other,
        };
        if settled != self.state {
            tracing::debug!(from = ?self.state, to = ?settled, hero = ?self.hero, "transition finished");
            self.state = settled;
        }
    }

    /// Drops any in-flight choreography and returns to the aggregate view.
    pub fn abort(&mut self, timeline: &mut Timeline, halo: &mut HaloState) {
        if self.state == ModeState::Aggregate {
            return;
        }
        timeline.cancel_group(TrackGroup::Transition);
        halo.active = true;
        tracing::debug!(from = ?self.state, "transition aborted");
        self.state = ModeState::Aggregate;
        self.hero = None;
    }

    /// Rotates the hero from a pointer drag. Only active while focused.
    pub fn drag(&self, dx: f32, dy: f32, field: &mut ParticleField, config: &ModeConfig) -> bool {
        if self.state != ModeState::Focused {
            return false;
        }
        let Some(hero) = self.hero.and_then(|i| field.instance_mut(i)) else {
            return false;
        };
        hero.rotation.y += dx * config.drag_sensitivity;
        hero.rotation.x += dy * config.drag_sensitivity;
        true
    }

    fn enter_focus(&mut self, parts: TransitionParts<'_>) -> ModeRequest {
        let TransitionParts {
            field,
            camera,
            timeline,
            halo,
            config,
        } = parts;

        let Some(hero_index) = select_hero(field, camera) else {
            tracing::debug!("no visible bean to focus");
            return ModeRequest::Rejected;
        };

        // Entrance pops would fight the collapse.
        timeline.cancel_group(TrackGroup::Entrance);
        halo.active = false;
        field.freeze();

        let duration = config.transition_duration;
        let hero_position = {
            let Some(hero) = field.instance_mut(hero_index) else {
                return ModeRequest::Rejected;
            };
            hero.rotation = normalize_rotation(hero.rotation);
            hero.position
        };

        let ease = Easing::QuadInOut;
        timeline.schedule(
            TrackSpec::new(
                TrackTarget::InstanceScale(hero_index),
                TrackGroup::Transition,
                TrackValue::Scalar(1.0),
            )
            .duration(duration)
            .ease(ease),
        );
        timeline.schedule(
            TrackSpec::new(
                TrackTarget::InstanceRotation(hero_index),
                TrackGroup::Transition,
                TrackValue::Vector(Vec3::ZERO),
            )
            .duration(duration)
            .ease(ease),
        );
        timeline.schedule(
            TrackSpec::new(
                TrackTarget::CameraPosition,
                TrackGroup::Transition,
                TrackValue::Vector(hero_position + Vec3::Z * camera.focus_distance),
            )
            .duration(duration)
            .ease(ease),
        );
        timeline.schedule(
            TrackSpec::new(
                TrackTarget::CameraTarget,
                TrackGroup::Transition,
                TrackValue::Vector(hero_position),
            )
            .duration(duration)
            .ease(ease),
        );

        let others = shuffled_others(field, hero_index, true);
        let stagger = stagger_step(duration, field.config().stagger_delay, others.len());
        for (slot, index) in others.iter().enumerate() {
            let scale = field.instances()[*index].scale;
            timeline.schedule_sequence(
                TrackTarget::InstanceScale(*index),
                TrackGroup::Transition,
                slot as f32 * stagger,
                &[
                    Keyframe::new(
                        TrackValue::Scalar(scale * COLLAPSE_OVERSHOOT),
                        duration * 0.15,
                        Easing::QuadOut,
                    ),
                    Keyframe::new(TrackValue::Scalar(0.0), duration * 0.25, Easing::BackIn {
                        overshoot: 1.2,
                    }),
                ],
            );
        }

        tracing::debug!(hero = hero_index, collapsing = others.len(), "entering focus");
        self.hero = Some(hero_index);
        self.state = ModeState::EnteringFocus;
        ModeRequest::Started(self.state)
    }

    fn exit_focus(&mut self, parts: TransitionParts<'_>) -> ModeRequest {
        let TransitionParts {
            field,
            camera,
            timeline,
            halo,
            config,
        } = parts;

        halo.active = true;
        field.release();
        let duration = config.transition_duration;

        if let Some(hero_index) = self.hero.filter(|&i| i < field.len()) {
            let target_scale = field.random_target_scale();
            let velocity = field.random_velocity();
            if let Some(hero) = field.instance_mut(hero_index) {
                hero.target_scale = target_scale;
                hero.velocity = velocity;
            }
            timeline.schedule(
                TrackSpec::new(
                    TrackTarget::InstanceScale(hero_index),
                    TrackGroup::Transition,
                    TrackValue::Scalar(target_scale),
                )
                .duration(duration)
                .ease(Easing::QuadInOut),
            );
        }

        timeline.schedule(
            TrackSpec::new(
                TrackTarget::CameraPosition,
                TrackGroup::Transition,
                TrackValue::Vector(camera.home_position),
            )
            .duration(duration)
            .ease(Easing::QuadInOut),
        );
        timeline.schedule(
            TrackSpec::new(
                TrackTarget::CameraTarget,
                TrackGroup::Transition,
                TrackValue::Vector(camera.home_target),
            )
            .duration(duration)
            .ease(Easing::QuadInOut),
        );

        let hero_index = self.hero.unwrap_or(usize::MAX);
        let others = shuffled_others(field, hero_index, false);
        let stagger = stagger_step(duration, field.config().stagger_delay, others.len());
        for (slot, index) in others.iter().enumerate() {
            let target = field.instances()[*index].target_scale;
            timeline.schedule_sequence(
                TrackTarget::InstanceScale(*index),
                TrackGroup::Transition,
                slot as f32 * stagger,
                &[
                    Keyframe::new(
                        TrackValue::Scalar(target * REVEAL_OVERSHOOT),
                        duration * 0.3,
                        Easing::QuadOut,
                    ),
                    Keyframe::new(TrackValue::Scalar(target), duration * 0.2, Easing::QuadInOut),
                ],
            );
        }

        tracing::debug!(hero = ?self.hero, revealing = others.len(), "exiting focus");
        self.state = ModeState::ExitingFocus;
        ModeRequest::Started(self.state)
    }
}

/// Visible instance in front of the camera whose NDC projection lies closest
/// to the screen centre.
pub fn select_hero(field: &ParticleField, camera: &Camera) -> Option<usize> {
    closest_to_center(
        field
            .instances()
            .iter()
            .enumerate()
            .filter(|(_, bean)| bean.is_visible())
            .filter_map(|(index, bean)| {
                camera
                    .project_in_front(bean.position)
                    .map(|ndc| (index, ndc.truncate()))
            }),
    )
}

/// Index of the point with the smallest distance to the origin.
pub fn closest_to_center<I>(points: I) -> Option<usize>
where
    I: IntoIterator<Item = (usize, Vec2)>,
{
    points
        .into_iter()
        .min_by(|(_, a), (_, b)| a.length_squared().total_cmp(&b.length_squared()))
        .map(|(index, _)| index)
}

/// Wraps an angle into `(-π, π]`.
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

pub fn normalize_rotation(rotation: Vec3) -> Vec3 {
    Vec3::new(
        normalize_angle(rotation.x),
        normalize_angle(rotation.y),
        normalize_angle(rotation.z),
    )
}

fn shuffled_others(field: &mut ParticleField, hero: usize, visible_only: bool) -> Vec<usize> {
    let mut others: Vec<usize> = field
        .instances()
        .iter()
        .enumerate()
        .filter(|(index, bean)| *index != hero && (!visible_only || bean.is_visible()))
        .map(|(index, _)| index)
        .collect();
    others.shuffle(field.rng());
    others
}

/// Per-instance delay: the field's stagger, compressed so the whole stagger
/// fits the window.
fn stagger_step(duration: f32, stagger_delay: f32, count: usize) -> f32 {
    if count == 0 {
        return 0.0;
    }
    let budget = duration * STAGGER_WINDOW / count as f32;
    stagger_delay.min(budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{FieldConfig, SpawnMode},
        geometry::{generate, MeshHandle, ShapeConfig},
        scene::CameraConfig,
        timeline::Animatable,
    };

    struct Rig {
        field: ParticleField,
        camera: Camera,
        timeline: Timeline,
        halo: HaloState,
        config: ModeConfig,
        controller: TransitionController,
    }

    impl Rig {
        fn new(count: u32) -> Self {
            let shape = ShapeConfig {
                segments_u: 4,
                segments_v: 4,
                ..ShapeConfig::default()
            };
            let config = FieldConfig {
                bean_count: count,
                ..FieldConfig::default()
            };
            let mut field = ParticleField::with_seed(
                config,
                MeshHandle::new(generate(&shape, shape.variant)),
                17,
            );
            let mut timeline = Timeline::new();
            field.reset(&mut timeline, SpawnMode::Static);
            Self {
                field,
                camera: Camera::new(&CameraConfig::default(), 16.0 / 9.0),
                timeline,
                halo: HaloState::default(),
                config: ModeConfig::default(),
                controller: TransitionController::new(),
            }
        }

        fn request(&mut self, focus: bool) -> ModeRequest {
            self.controller.request(
                focus,
                TransitionParts {
                    field: &mut self.field,
                    camera: &self.camera,
                    timeline: &mut self.timeline,
                    halo: &mut self.halo,
                    config: &self.config,
                },
            )
        }

        fn step(&mut self, dt: f32) {
            let mut targets = crate::scene::SceneTargets {
                field: &mut self.field,
                camera: &mut self.camera,
            };
            self.timeline.advance(dt, &mut targets);
            self.controller.update(&self.timeline);
            self.field.tick(dt * 60.0);
        }

        fn run(&mut self, seconds: f32) {
            let steps = (seconds * 60.0).ceil() as usize;
            for _ in 0..steps {
                self.step(1.0 / 60.0);
            }
        }

        fn scales(&self) -> Vec<f32> {
            self.field.instances().iter().map(|b| b.scale).collect()
        }

        /// Every instance's scale after each fine step.
        fn scale_history(&mut self, seconds: f32) -> Vec<Vec<f32>> {
            let steps = (seconds / FINE_STEP).ceil() as usize;
            (0..steps)
                .map(|_| {
                    self.step(FINE_STEP);
                    self.scales()
                })
                .collect()
        }
    }

    const FINE_STEP: f32 = 1.0 / 600.0;

    fn peak(history: &[Vec<f32>], index: usize) -> f32 {
        history.iter().map(|frame| frame[index]).fold(0.0, f32::max)
    }

    /// Checks non-hero instances start moving one stagger step apart, in an
    /// order other than spawn order.
    fn assert_shuffled_stagger(history: &[Vec<f32>], initial: &[f32], hero: usize, step: f32) {
        let mut starts: Vec<(usize, f32)> = (0..initial.len())
            .filter(|&i| i != hero)
            .map(|i| {
                let first = history
                    .iter()
                    .position(|frame| (frame[i] - initial[i]).abs() > 1e-6)
                    .unwrap_or_else(|| panic!("instance {i} never animated"));
                (i, first as f32 * FINE_STEP)
            })
            .collect();
        starts.sort_by(|a, b| a.1.total_cmp(&b.1));

        for pair in starts.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(
                (gap - step).abs() <= 2.5 * FINE_STEP,
                "gap {gap} between {} and {}, expected {step}",
                pair[0].0,
                pair[1].0
            );
        }

        let order: Vec<usize> = starts.iter().map(|(i, _)| *i).collect();
        let mut spawn_order = order.clone();
        spawn_order.sort_unstable();
        assert_ne!(order, spawn_order);
    }

    #[test]
    fn picks_the_point_nearest_the_centre() {
        let points = [
            (0, Vec2::new(0.9, 0.0)),
            (1, Vec2::new(0.0, 0.05)),
            (2, Vec2::new(-0.4, 0.0)),
        ];
        assert_eq!(closest_to_center(points), Some(1));
        assert_eq!(closest_to_center(Vec::new()), None);
    }

    #[test]
    fn angles_normalise_to_the_short_way_round() {
        assert!((normalize_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-5);
        assert!((normalize_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        assert!((normalize_angle(PI) - PI).abs() < 1e-5);
        assert!((normalize_angle(0.25) - 0.25).abs() < 1e-6);
        assert!(normalize_angle(5.0 * TAU + 0.1) > 0.0);
    }

    #[test]
    fn hero_selection_ignores_hidden_instances() {
        let mut rig = Rig::new(3);
        for (i, bean) in rig.field.instances_mut().iter_mut().enumerate() {
            bean.position = Vec3::new(i as f32 * 2.0, 0.0, 0.0);
        }
        rig.field.instance_mut(0).unwrap().scale = 0.0;
        assert_eq!(select_hero(&rig.field, &rig.camera), Some(1));
    }

    #[test]
    fn hero_selection_skips_instances_behind_the_camera() {
        let mut rig = Rig::new(3);
        let positions = [
            // Behind the camera, on its axis: projects to the centre if unchecked.
            Vec3::new(0.0, 0.0, rig.camera.position.z + 2.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
        ];
        for (bean, position) in rig.field.instances_mut().iter_mut().zip(positions) {
            bean.position = position;
        }
        assert_eq!(select_hero(&rig.field, &rig.camera), Some(1));
    }

    #[test]
    fn collapse_overshoots_in_a_shuffled_stagger() {
        let mut rig = Rig::new(12);
        let initial = rig.scales();
        rig.request(true);
        let hero = rig.controller.hero().unwrap();
        let duration = rig.config.transition_duration;
        let history = rig.scale_history(duration + 0.1);

        for (i, &start) in initial.iter().enumerate().filter(|(i, _)| *i != hero) {
            let top = peak(&history, i);
            assert!(top >= start * COLLAPSE_OVERSHOOT - 1e-4, "instance {i} peaked at {top}");
            // BackIn anticipation adds a little on top of the overshoot.
            assert!(top <= start * COLLAPSE_OVERSHOOT * 1.06, "instance {i} peaked at {top}");
            assert_eq!(history.last().unwrap()[i], 0.0);
        }

        let step = stagger_step(duration, rig.field.config().stagger_delay, initial.len() - 1);
        assert!(step > 0.0);
        assert_shuffled_stagger(&history, &initial, hero, step);
    }

    #[test]
    fn reveal_overshoots_targets_in_a_shuffled_stagger() {
        let mut rig = Rig::new(12);
        rig.request(true);
        rig.run(rig.config.transition_duration + 0.1);
        let hero = rig.controller.hero().unwrap();
        let initial = rig.scales();

        rig.request(false);
        let targets: Vec<f32> = rig.field.instances().iter().map(|b| b.target_scale).collect();
        let duration = rig.config.transition_duration;
        let history = rig.scale_history(duration + 0.1);

        for (i, &target) in targets.iter().enumerate().filter(|(i, _)| *i != hero) {
            let top = peak(&history, i);
            assert!(
                (top / target - REVEAL_OVERSHOOT).abs() < 0.01,
                "instance {i} peaked at {top} for target {target}"
            );
            assert!((history.last().unwrap()[i] - target).abs() < 1e-5);
        }

        let step = stagger_step(duration, rig.field.config().stagger_delay, initial.len() - 1);
        assert_shuffled_stagger(&history, &initial, hero, step);
    }

    #[test]
    fn hero_rotation_takes_the_short_way_to_rest() {
        let mut rig = Rig::new(6);
        for bean in rig.field.instances_mut() {
            bean.rotation = Vec3::new(5.5, -4.0, 6.0);
        }
        rig.request(true);
        let hero = rig.controller.hero().unwrap();
        assert!(rig.field.instances()[hero].rotation.abs().max_element() <= PI);

        let steps = ((rig.config.transition_duration + 0.1) / FINE_STEP).ceil() as usize;
        for _ in 0..steps {
            rig.step(FINE_STEP);
            let rotation = rig.field.instances()[hero].rotation;
            assert!(rotation.abs().max_element() <= PI + 1e-5, "{rotation:?}");
        }
        assert!(rig.field.instances()[hero].rotation.length() < 1e-5);
    }

    #[test]
    fn second_enter_request_is_rejected_mid_transition() {
        let mut rig = Rig::new(10);
        assert_eq!(rig.request(true), ModeRequest::Started(ModeState::EnteringFocus));
        let scheduled = rig.timeline.len();

        assert_eq!(rig.request(true), ModeRequest::Rejected);
        assert_eq!(rig.request(false), ModeRequest::Rejected);
        assert_eq!(rig.controller.state(), ModeState::EnteringFocus);
        assert_eq!(rig.timeline.len(), scheduled);
    }

    #[test]
    fn full_round_trip_through_focus() {
        let mut rig = Rig::new(12);
        assert_eq!(rig.request(false), ModeRequest::Unchanged);

        rig.request(true);
        let hero = rig.controller.hero().unwrap();
        assert!(!rig.halo.active);
        assert!(rig.field.is_frozen());

        rig.run(rig.config.transition_duration + 0.1);
        assert_eq!(rig.controller.state(), ModeState::Focused);
        let bean = &rig.field.instances()[hero];
        assert!((bean.scale - 1.0).abs() < 1e-5);
        assert!(bean.rotation.length() < 1e-5);
        assert!(rig
            .field
            .instances()
            .iter()
            .enumerate()
            .all(|(i, b)| i == hero || b.scale == 0.0));
        assert!(rig.camera.target.distance(bean.position) < 1e-4);
        assert_eq!(rig.request(true), ModeRequest::Unchanged);

        assert_eq!(rig.request(false), ModeRequest::Started(ModeState::ExitingFocus));
        assert!(rig.halo.active);
        assert!(!rig.field.is_frozen());

        rig.run(rig.config.transition_duration + 0.1);
        assert_eq!(rig.controller.state(), ModeState::Aggregate);
        for bean in rig.field.instances() {
            assert!((bean.scale - bean.target_scale).abs() < 1e-5);
        }
        assert!(rig.camera.position.distance(rig.camera.home_position) < 1e-4);
    }

    #[test]
    fn drag_rotates_only_when_focused() {
        let mut rig = Rig::new(4);
        assert!(!rig.controller.drag(10.0, 0.0, &mut rig.field, &rig.config));

        rig.request(true);
        rig.run(rig.config.transition_duration + 0.1);
        let hero = rig.controller.hero().unwrap();
        assert!(rig.controller.drag(10.0, -5.0, &mut rig.field, &rig.config));
        let rotation = rig.field.instances()[hero].rotation;
        assert!((rotation.y - 0.1).abs() < 1e-5);
        assert!((rotation.x + 0.05).abs() < 1e-5);
    }

    #[test]
    fn nothing_visible_rejects_focus() {
        let mut rig = Rig::new(3);
        for bean in rig.field.instances_mut() {
            bean.scale = 0.0;
        }
        assert_eq!(rig.request(true), ModeRequest::Rejected);
        assert_eq!(rig.controller.state(), ModeState::Aggregate);
        assert!(rig.halo.active);
    }

    #[test]
    fn abort_returns_to_aggregate() {
        let mut rig = Rig::new(6);
        rig.request(true);
        rig.controller.abort(&mut rig.timeline, &mut rig.halo);
        assert_eq!(rig.controller.state(), ModeState::Aggregate);
        assert!(!rig.timeline.has_group(TrackGroup::Transition));
        assert!(rig.halo.active);
    }

    #[test]
    fn stagger_fits_inside_the_window() {
        let duration = ModeConfig::default().transition_duration;
        let delay = FieldConfig::default().stagger_delay;
        let step = stagger_step(duration, delay, 1000);
        assert!(step * 1000.0 <= duration * STAGGER_WINDOW + 1e-4);
        assert_eq!(stagger_step(duration, delay, 2), delay);
        assert_eq!(stagger_step(duration, delay, 0), 0.0);
    }

    #[test]
    fn scene_targets_expose_instance_scale() {
        let mut rig = Rig::new(2);
        let targets = crate::scene::SceneTargets {
            field: &mut rig.field,
            camera: &mut rig.camera,
        };
        assert!(targets.read(TrackTarget::InstanceScale(1)).is_some());
        assert!(targets.read(TrackTarget::InstanceScale(5)).is_none());
    }
}
