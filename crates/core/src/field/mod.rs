//! Drifting population of bean instances.

use std::f32::consts::TAU;

use glam::{EulerRot, Mat4, Quat, Vec3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    geometry::MeshHandle,
    shading::StyleOverrides,
    timeline::{Easing, Timeline, TrackGroup, TrackSpec, TrackTarget, TrackValue},
    BeanError, Result,
};

/// Extra margin beyond the spawn spread before an instance wraps around.
pub const WRAP_MARGIN: f32 = 2.0;

/// How instance colors are chosen at spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Every instance uses the shared style.
    #[default]
    Single,
    /// Each instance gets a random color theme.
    Blend,
}

/// Population, spawn volume and motion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldConfig {
    pub bean_count: u32,
    pub spread_x: f32,
    pub spread_y: f32,
    pub depth_min: f32,
    pub depth_max: f32,
    pub scale_min: f32,
    pub scale_max: f32,
    /// Maximum linear drift per nominal frame.
    pub drift_speed: f32,
    /// Maximum angular velocity per nominal frame, radians.
    pub rotation_speed: f32,
    pub color_mode: ColorMode,
    pub animate_entrance: bool,
    pub stagger_delay: f32,
    pub animation_duration: f32,
    pub elastic_amplitude: f32,
    pub elastic_period: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            bean_count: 40,
            spread_x: 10.0,
            spread_y: 6.0,
            depth_min: -6.0,
            depth_max: 2.0,
            scale_min: 0.3,
            scale_max: 0.7,
            drift_speed: 0.01,
            rotation_speed: 0.01,
            color_mode: ColorMode::Single,
            animate_entrance: true,
            stagger_delay: 0.03,
            animation_duration: 1.2,
            elastic_amplitude: 1.0,
            elastic_period: 0.4,
        }
    }
}

impl FieldConfig {
    pub fn bounds(&self) -> SpawnBounds {
        SpawnBounds {
            spread_x: self.spread_x,
            spread_y: self.spread_y,
            depth_min: self.depth_min,
            depth_max: self.depth_max,
        }
    }

    pub fn scale_range(&self) -> (f32, f32) {
        (self.scale_min, self.scale_max)
    }

    pub fn entrance_easing(&self) -> Easing {
        Easing::ElasticOut {
            amplitude: self.elastic_amplitude,
            period: self.elastic_period,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.spread_x < 0.0 || self.spread_y < 0.0 {
            return Err(BeanError::invalid("spread", "must not be negative"));
        }
        if self.depth_min > self.depth_max {
            return Err(BeanError::invalid("depthMin", "must not exceed depthMax"));
        }
        if self.scale_min < 0.0 || self.scale_min > self.scale_max {
            return Err(BeanError::invalid(
                "scaleMin",
                "must be non-negative and not exceed scaleMax",
            ));
        }
        Ok(())
    }
}

/// Axis-aligned spawn volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnBounds {
    pub spread_x: f32,
    pub spread_y: f32,
    pub depth_min: f32,
    pub depth_max: f32,
}

impl SpawnBounds {
    pub fn wrap_x(&self) -> f32 {
        self.spread_x + WRAP_MARGIN
    }

    pub fn wrap_y(&self) -> f32 {
        self.spread_y + WRAP_MARGIN
    }
}

/// Linear and angular drift per nominal frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
    pub vrx: f32,
    pub vry: f32,
    pub vrz: f32,
}

/// Whether freshly spawned instances start hidden and pop in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    Animated,
    Static,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeanInstance {
    pub position: Vec3,
    /// Euler angles (XYZ order), radians.
    pub rotation: Vec3,
    pub scale: f32,
    pub target_scale: f32,
    pub velocity: Velocity,
    pub overrides: Option<StyleOverrides>,
}

impl BeanInstance {
    pub fn is_visible(&self) -> bool {
        self.scale > 0.0
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.orientation(),
            self.position,
        )
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }
}

/// Owns every instance plus the mesh they share.
#[derive(Debug)]
pub struct ParticleField {
    config: FieldConfig,
    bounds: SpawnBounds,
    mesh: MeshHandle,
    instances: Vec<BeanInstance>,
    rng: StdRng,
    frozen: bool,
}

impl ParticleField {
    pub fn new(config: FieldConfig, mesh: MeshHandle, rng: StdRng) -> Self {
        Self {
            bounds: config.bounds(),
            config,
            mesh,
            instances: Vec::new(),
            rng,
            frozen: false,
        }
    }

    pub fn with_seed(config: FieldConfig, mesh: MeshHandle, seed: u64) -> Self {
        Self::new(config, mesh, StdRng::seed_from_u64(seed))
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn bounds(&self) -> SpawnBounds {
        self.bounds
    }

    pub fn mesh(&self) -> &MeshHandle {
        &self.mesh
    }

    pub fn instances(&self) -> &[BeanInstance] {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut [BeanInstance] {
        &mut self.instances
    }

    pub fn instance(&self, index: usize) -> Option<&BeanInstance> {
        self.instances.get(index)
    }

    pub fn instance_mut(&mut self, index: usize) -> Option<&mut BeanInstance> {
        self.instances.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Stops integration; animation tracks still write transforms.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn release(&mut self) {
        self.frozen = false;
    }

    /// Replaces the configuration used by the next spawn or velocity redraw.
    pub fn set_config(&mut self, config: FieldConfig) {
        self.bounds = config.bounds();
        self.config = config;
    }

    /// Applies a viewport-driven spawn volume without respawning. Instances
    /// left outside a shrunken volume are pulled back to its edge.
    pub fn set_bounds(&mut self, bounds: SpawnBounds) {
        self.bounds = bounds;
        let (wrap_x, wrap_y) = (bounds.wrap_x(), bounds.wrap_y());
        for bean in &mut self.instances {
            bean.position.x = bean.position.x.clamp(-wrap_x, wrap_x);
            bean.position.y = bean.position.y.clamp(-wrap_y, wrap_y);
        }
    }

    /// Appends `count` instances drawn from `bounds` and `scale_range`.
    pub fn spawn(
        &mut self,
        count: usize,
        bounds: SpawnBounds,
        scale_range: (f32, f32),
        mode: SpawnMode,
    ) {
        self.instances.reserve(count);
        for _ in 0..count {
            let instance = self.random_instance(bounds, scale_range, mode);
            self.instances.push(instance);
        }
    }

    fn random_instance(
        &mut self,
        bounds: SpawnBounds,
        scale_range: (f32, f32),
        mode: SpawnMode,
    ) -> BeanInstance {
        let position = Vec3::new(
            symmetric(&mut self.rng, bounds.spread_x),
            symmetric(&mut self.rng, bounds.spread_y),
            between(&mut self.rng, bounds.depth_min, bounds.depth_max),
        );
        let rotation = Vec3::new(
            self.rng.gen_range(0.0..TAU),
            self.rng.gen_range(0.0..TAU),
            self.rng.gen_range(0.0..TAU),
        );
        let target_scale = between(&mut self.rng, scale_range.0, scale_range.1);
        let velocity = self.random_velocity();
        let overrides = match self.config.color_mode {
            ColorMode::Single => None,
            ColorMode::Blend => Some(StyleOverrides::random_theme(&mut self.rng)),
        };

        BeanInstance {
            position,
            rotation,
            scale: match mode {
                SpawnMode::Animated => 0.0,
                SpawnMode::Static => target_scale,
            },
            target_scale,
            velocity,
            overrides,
        }
    }

    pub fn random_velocity(&mut self) -> Velocity {
        let drift = self.config.drift_speed;
        let spin = self.config.rotation_speed;
        Velocity {
            vx: symmetric(&mut self.rng, drift),
            vy: symmetric(&mut self.rng, drift),
            vrx: symmetric(&mut self.rng, spin),
            vry: symmetric(&mut self.rng, spin),
            vrz: symmetric(&mut self.rng, spin),
        }
    }

    pub fn random_target_scale(&mut self) -> f32 {
        let (min, max) = self.config.scale_range();
        between(&mut self.rng, min, max)
    }

    /// Redraws every velocity from the current drift/rotation speeds.
    pub fn recompute_velocities(&mut self) {
        for index in 0..self.instances.len() {
            let velocity = self.random_velocity();
            self.instances[index].velocity = velocity;
        }
    }

    /// Advances every visible instance by `frames` nominal 60 Hz frames, then
    /// wraps positions that left the field.
    pub fn tick(&mut self, frames: f32) {
        if self.frozen {
            return;
        }
        let wrap_x = self.bounds.wrap_x();
        let wrap_y = self.bounds.wrap_y();
        for bean in self.instances.iter_mut().filter(|b| b.is_visible()) {
            let v = bean.velocity;
            let step_x = v.vx * frames;
            let step_y = v.vy * frames;
            bean.position.x += step_x;
            bean.position.y += step_y;
            bean.rotation += Vec3::new(v.vrx, v.vry, v.vrz) * frames;

            bean.position.x = wrap(bean.position.x, step_x, wrap_x);
            bean.position.y = wrap(bean.position.y, step_y, wrap_y);
        }
    }

    /// Clears the population and respawns `bean_count` instances. In-flight
    /// per-instance tracks are cancelled first so none outlive their slot.
    pub fn reset(&mut self, timeline: &mut Timeline, mode: SpawnMode) {
        let cancelled = timeline.cancel_instances();
        self.instances.clear();
        let count = self.config.bean_count as usize;
        self.spawn(count, self.bounds, self.config.scale_range(), mode);
        self.frozen = false;
        tracing::debug!(count, cancelled, ?mode, "respawned bean field");

        if mode == SpawnMode::Animated {
            self.schedule_entrance(timeline);
        }
    }

    /// Pops every instance from zero to its target scale, staggered in spawn
    /// order.
    pub fn schedule_entrance(&self, timeline: &mut Timeline) {
        let easing = self.config.entrance_easing();
        for (index, bean) in self.instances.iter().enumerate() {
            timeline.schedule(
                TrackSpec::new(
                    TrackTarget::InstanceScale(index),
                    TrackGroup::Entrance,
                    TrackValue::Scalar(bean.target_scale),
                )
                .delay(index as f32 * self.config.stagger_delay)
                .duration(self.config.animation_duration)
                .ease(easing),
            );
        }
    }

    /// Swaps the shared mesh; transforms are untouched.
    pub fn rebuild_geometry(&mut self, mesh: MeshHandle) {
        tracing::debug!(
            from = self.mesh.generation(),
            to = mesh.generation(),
            "swapping bean mesh"
        );
        self.mesh = mesh;
    }
}

/// Mirrors a coordinate that crossed `±bound` while moving outward by `step`
/// this tick. An instance already heading back in is left alone, so a
/// mirrored overshoot cannot bounce between the edges. The overshoot carried
/// across is capped at [`WRAP_MARGIN`].
pub fn wrap(value: f32, step: f32, bound: f32) -> f32 {
    let overshoot = value.abs() - bound;
    if overshoot <= 0.0 || value * step <= 0.0 {
        return value;
    }
    -value.signum() * (bound + overshoot.min(WRAP_MARGIN))
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, half_extent: f32) -> f32 {
    (rng.gen::<f32>() - 0.5) * 2.0 * half_extent
}

fn between<R: Rng + ?Sized>(rng: &mut R, min: f32, max: f32) -> f32 {
    min + rng.gen::<f32>() * (max - min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{generate, ShapeConfig};

    fn mesh() -> MeshHandle {
        let shape = ShapeConfig {
            segments_u: 4,
            segments_v: 4,
            ..ShapeConfig::default()
        };
        MeshHandle::new(generate(&shape, shape.variant))
    }

    fn still_config(count: u32, spread: f32) -> FieldConfig {
        FieldConfig {
            bean_count: count,
            spread_x: spread,
            spread_y: spread,
            scale_min: 0.1,
            scale_max: 0.2,
            drift_speed: 0.0,
            rotation_speed: 0.0,
            ..FieldConfig::default()
        }
    }

    #[test]
    fn spawn_respects_bounds_and_ranges() {
        let config = FieldConfig::default();
        let mut field = ParticleField::with_seed(config.clone(), mesh(), 7);
        field.spawn(200, config.bounds(), config.scale_range(), SpawnMode::Static);

        assert_eq!(field.len(), 200);
        for bean in field.instances() {
            assert!(bean.position.x.abs() <= config.spread_x);
            assert!(bean.position.y.abs() <= config.spread_y);
            assert!((config.depth_min..=config.depth_max).contains(&bean.position.z));
            assert!((config.scale_min..=config.scale_max).contains(&bean.target_scale));
            assert_eq!(bean.scale, bean.target_scale);
            assert!(bean.rotation.min_element() >= 0.0 && bean.rotation.max_element() < TAU);
            assert!(bean.velocity.vx.abs() <= config.drift_speed);
            assert!(bean.velocity.vrz.abs() <= config.rotation_speed);
            assert!(bean.overrides.is_none());
        }
    }

    #[test]
    fn animated_spawn_starts_hidden() {
        let config = FieldConfig::default();
        let mut field = ParticleField::with_seed(config.clone(), mesh(), 1);
        field.spawn(10, config.bounds(), config.scale_range(), SpawnMode::Animated);
        assert!(field.instances().iter().all(|b| b.scale == 0.0 && b.target_scale > 0.0));
    }

    #[test]
    fn blend_mode_assigns_themes() {
        let config = FieldConfig {
            color_mode: ColorMode::Blend,
            ..FieldConfig::default()
        };
        let mut field = ParticleField::with_seed(config.clone(), mesh(), 3);
        field.spawn(20, config.bounds(), config.scale_range(), SpawnMode::Static);
        assert!(field.instances().iter().all(|b| b.overrides.is_some()));
    }

    #[test]
    fn wrap_mirrors_only_past_the_margin() {
        let bound = 10.0 + WRAP_MARGIN;
        assert_eq!(wrap(10.5, 0.1, bound), 10.5);
        assert_eq!(wrap(12.1, 0.1, bound), -12.1);
        assert_eq!(wrap(-12.5, -0.1, bound), 12.5);
        assert_eq!(wrap(12.0, 0.1, bound), 12.0);
    }

    #[test]
    fn wrap_leaves_inbound_and_still_instances_alone() {
        let bound = 12.0;
        assert_eq!(wrap(-12.19, 0.01, bound), -12.19);
        assert_eq!(wrap(12.5, 0.0, bound), 12.5);
        // Overshoot carried across is capped at the margin.
        assert_eq!(wrap(40.0, 30.0, bound), -(bound + WRAP_MARGIN));
    }

    #[test]
    fn long_frame_wrap_does_not_oscillate() {
        let mut field = ParticleField::with_seed(still_config(1, 10.0), mesh(), 3);
        field.reset(&mut Timeline::new(), SpawnMode::Static);
        let bean = field.instance_mut(0).unwrap();
        bean.position.x = 11.9;
        bean.velocity.vx = 0.01;

        field.tick(30.0);
        let mut previous = field.instances()[0].position.x;
        assert!((previous + 12.2).abs() < 1e-4);
        for _ in 0..6 {
            field.tick(1.0);
            let x = field.instances()[0].position.x;
            assert!(x < 0.0, "bean flipped back to {x}");
            assert!((x - previous - 0.01).abs() < 1e-4);
            previous = x;
        }
    }

    #[test]
    fn shrinking_bounds_pulls_instances_inside() {
        let mut field = ParticleField::with_seed(still_config(1, 10.0), mesh(), 4);
        field.reset(&mut Timeline::new(), SpawnMode::Static);
        let bean = field.instance_mut(0).unwrap();
        bean.position.x = 9.0;
        bean.velocity.vx = -0.01;

        let mut bounds = field.bounds();
        bounds.spread_x = 5.0;
        field.set_bounds(bounds);
        let bound = bounds.wrap_x();
        assert_eq!(field.instances()[0].position.x, bound);

        let mut previous = bound;
        for _ in 0..6 {
            field.tick(1.0);
            let x = field.instances()[0].position.x;
            assert!(x.abs() <= bound);
            assert!(x < previous);
            previous = x;
        }
    }

    #[test]
    fn tick_wraps_an_instance_driven_out_of_range() {
        let mut field = ParticleField::with_seed(still_config(1, 10.0), mesh(), 2);
        field.reset(&mut Timeline::new(), SpawnMode::Static);

        let bean = field.instance_mut(0).unwrap();
        bean.position.x = 10.5;
        field.tick(1.0);
        assert_eq!(field.instances()[0].position.x, 10.5);

        let bean = field.instance_mut(0).unwrap();
        bean.position.x = 11.6;
        bean.velocity.vx = 0.5;
        field.tick(1.0);
        assert!((field.instances()[0].position.x + 12.1).abs() < 1e-5);
    }

    #[test]
    fn still_field_does_not_move_and_drifting_bean_wraps() {
        let mut field = ParticleField::with_seed(still_config(50, 5.0), mesh(), 42);
        field.reset(&mut Timeline::new(), SpawnMode::Static);
        assert_eq!(field.len(), 50);

        let before: Vec<_> = field.instances().to_vec();
        field.tick(1.0);
        assert_eq!(field.instances(), before.as_slice());

        let bean = field.instance_mut(0).unwrap();
        bean.position.x = 6.9;
        bean.velocity.vx = 1.0;
        field.tick(1.0);
        assert!((field.instances()[0].position.x + 7.9).abs() < 1e-5);
        assert_eq!(&field.instances()[1..], &before[1..]);
    }

    #[test]
    fn hidden_and_frozen_instances_are_skipped() {
        let config = FieldConfig {
            drift_speed: 0.5,
            ..still_config(2, 5.0)
        };
        let mut field = ParticleField::with_seed(config, mesh(), 5);
        field.reset(&mut Timeline::new(), SpawnMode::Static);
        field.instance_mut(0).unwrap().scale = 0.0;
        let before: Vec<_> = field.instances().to_vec();

        field.tick(1.0);
        assert_eq!(field.instances()[0], before[0]);

        let moved = field.instances()[1].clone();
        field.freeze();
        field.tick(1.0);
        assert_eq!(field.instances()[1], moved);
    }

    #[test]
    fn reset_cancels_instance_tracks_and_schedules_entrance() {
        let config = still_config(5, 5.0);
        let mut field = ParticleField::with_seed(config, mesh(), 11);
        let mut timeline = Timeline::new();
        timeline.schedule(
            TrackSpec::new(
                TrackTarget::InstanceScale(99),
                TrackGroup::Transition,
                TrackValue::Scalar(3.0),
            )
            .duration(1.0),
        );

        field.reset(&mut timeline, SpawnMode::Animated);
        assert_eq!(field.len(), 5);
        assert!(!timeline.has_target(TrackTarget::InstanceScale(99)));
        assert_eq!(timeline.len(), 5);
        assert!(timeline.has_group(TrackGroup::Entrance));
    }

    #[test]
    fn recompute_velocities_uses_new_speeds() {
        let mut field = ParticleField::with_seed(still_config(10, 5.0), mesh(), 9);
        field.reset(&mut Timeline::new(), SpawnMode::Static);
        let mut config = field.config().clone();
        config.drift_speed = 0.2;
        field.set_config(config);
        field.recompute_velocities();
        assert!(field.instances().iter().any(|b| b.velocity.vx != 0.0));
        assert!(field.instances().iter().all(|b| b.velocity.vx.abs() <= 0.2));
    }

    #[test]
    fn rebuild_keeps_transforms() {
        let mut field = ParticleField::with_seed(still_config(3, 5.0), mesh(), 4);
        field.reset(&mut Timeline::new(), SpawnMode::Static);
        let before: Vec<_> = field.instances().to_vec();
        let replacement = mesh();
        field.rebuild_geometry(replacement.clone());
        assert!(field.mesh().ptr_eq(&replacement));
        assert_eq!(field.instances(), before.as_slice());
    }
}
