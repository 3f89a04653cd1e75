use glam::{Mat4, Vec3};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    field::{ParticleField, SpawnMode},
    geometry::{generate, MeshHandle},
    halo::{BreatheAxis, HaloState},
    params::{self, ParamEffect, ParamValue},
    timeline::{Animatable, Timeline, TrackTarget, TrackValue},
    transition::{ModeRequest, ModeState, TransitionController, TransitionParts},
    Result,
};

/// Viewports narrower than this use the vertical breathing axis.
pub const MOBILE_BREAKPOINT: u32 = 768;

/// Nominal display rate the per-frame velocities are expressed in.
pub const NOMINAL_FPS: f32 = 60.0;

/// Clip-space `w` below which a point counts as behind the camera.
pub const MIN_CLIP_W: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    /// Distance from the origin in the aggregate view.
    pub distance: f32,
    pub fov_degrees: f32,
    /// Distance kept from the hero in the focused view.
    pub focus_distance: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            distance: 10.0,
            fov_degrees: 45.0,
            focus_distance: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub home_position: Vec3,
    pub home_target: Vec3,
    pub focus_distance: f32,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        let home = Vec3::Z * config.distance;
        Self {
            position: home,
            target: Vec3::ZERO,
            home_position: home,
            home_target: Vec3::ZERO,
            focus_distance: config.focus_distance,
            fov_y: config.fov_degrees.to_radians(),
            aspect,
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// World position to normalised device coordinates.
    pub fn project_to_ndc(&self, world: Vec3) -> Vec3 {
        self.view_projection().project_point3(world)
    }

    /// Like [`Camera::project_to_ndc`], but `None` for points on or behind
    /// the camera plane, whose projection is undefined or mirrored.
    pub fn project_in_front(&self, world: Vec3) -> Option<Vec3> {
        let clip = self.view_projection() * world.extend(1.0);
        (clip.w >= MIN_CLIP_W).then(|| clip.truncate() / clip.w)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    pub fn breathe_axis(&self) -> BreatheAxis {
        if self.width < MOBILE_BREAKPOINT {
            BreatheAxis::Vertical
        } else {
            BreatheAxis::Horizontal
        }
    }
}

/// Animatable view over the parts of the scene tracks write into.
pub struct SceneTargets<'a> {
    pub field: &'a mut ParticleField,
    pub camera: &'a mut Camera,
}

impl Animatable for SceneTargets<'_> {
    fn read(&self, target: TrackTarget) -> Option<TrackValue> {
        match target {
            TrackTarget::InstanceScale(i) => {
                self.field.instance(i).map(|b| TrackValue::Scalar(b.scale))
            }
            TrackTarget::InstanceRotation(i) => {
                self.field.instance(i).map(|b| TrackValue::Vector(b.rotation))
            }
            TrackTarget::InstancePosition(i) => {
                self.field.instance(i).map(|b| TrackValue::Vector(b.position))
            }
            TrackTarget::CameraPosition => Some(TrackValue::Vector(self.camera.position)),
            TrackTarget::CameraTarget => Some(TrackValue::Vector(self.camera.target)),
        }
    }

    fn write(&mut self, target: TrackTarget, value: TrackValue) {
        match (target, value) {
            (TrackTarget::InstanceScale(i), TrackValue::Scalar(v)) => {
                if let Some(bean) = self.field.instance_mut(i) {
                    bean.scale = v.max(0.0);
                }
            }
            (TrackTarget::InstanceRotation(i), TrackValue::Vector(v)) => {
                if let Some(bean) = self.field.instance_mut(i) {
                    bean.rotation = v;
                }
            }
            (TrackTarget::InstancePosition(i), TrackValue::Vector(v)) => {
                if let Some(bean) = self.field.instance_mut(i) {
                    bean.position = v;
                }
            }
            (TrackTarget::CameraPosition, TrackValue::Vector(v)) => self.camera.position = v,
            (TrackTarget::CameraTarget, TrackValue::Vector(v)) => self.camera.target = v,
            (target, value) => {
                tracing::warn!(?target, ?value, "track value does not fit its target");
            }
        }
    }
}

/// Everything one running scene owns. Constructed once and driven by
/// [`RenderContext::frame`] from the host's display callback.
#[derive(Debug)]
pub struct RenderContext {
    config: AppConfig,
    viewport: Viewport,
    camera: Camera,
    field: ParticleField,
    halo: HaloState,
    timeline: Timeline,
    transition: TransitionController,
    frame_index: u64,
}

impl RenderContext {
    /// Starts a scene if a viewport is available. Without one the scene never
    /// ticks; that is a quiet degradation rather than an error.
    pub fn mount(config: AppConfig, viewport: Option<Viewport>, rng: StdRng) -> Result<Option<Self>> {
        match viewport {
            Some(viewport) => Self::new(config, viewport, rng).map(Some),
            None => {
                tracing::warn!("no viewport available; scene will not start");
                Ok(None)
            }
        }
    }

    pub fn new(config: AppConfig, viewport: Viewport, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let mesh = MeshHandle::new(generate(&config.shape, config.shape.variant));
        let field = ParticleField::new(config.field.clone(), mesh, rng);
        let camera = Camera::new(&config.camera, viewport.aspect());

        let mut context = Self {
            config,
            viewport,
            camera,
            field,
            halo: HaloState::default(),
            timeline: Timeline::new(),
            transition: TransitionController::new(),
            frame_index: 0,
        };
        context.reflow();
        context.respawn();
        // Scenes always start aggregate; the toggle must reflect that.
        context.config.mode.single_bean_mode = false;
        tracing::info!(
            beans = context.field.len(),
            width = viewport.width,
            height = viewport.height,
            "scene mounted"
        );
        Ok(context)
    }

    pub fn with_seed(config: AppConfig, viewport: Viewport, seed: u64) -> Result<Self> {
        Self::new(config, viewport, StdRng::seed_from_u64(seed))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn field(&self) -> &ParticleField {
        &self.field
    }

    pub fn halo(&self) -> &HaloState {
        &self.halo
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn mode(&self) -> ModeState {
        self.transition.state()
    }

    pub fn hero(&self) -> Option<usize> {
        self.transition.hero()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Whether the halo pass should run this frame.
    pub fn halo_visible(&self) -> bool {
        self.config.halo.enabled && self.halo.active
    }

    /// One display frame: tracks, transition bookkeeping, drift, halo clock.
    pub fn frame(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        let mut targets = SceneTargets {
            field: &mut self.field,
            camera: &mut self.camera,
        };
        self.timeline.advance(dt, &mut targets);
        self.transition.update(&self.timeline);
        self.field.tick(dt * NOMINAL_FPS);
        self.halo.advance(dt);
        self.frame_index += 1;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::new(width, height);
        self.camera.aspect = self.viewport.aspect();
        self.reflow();
        tracing::debug!(width, height, "viewport resized");
    }

    /// Narrow viewports pull the horizontal spread in.
    fn reflow(&mut self) {
        let mut bounds = self.config.field.bounds();
        bounds.spread_x *= self.viewport.aspect().min(1.0);
        self.field.set_bounds(bounds);
    }

    /// Regenerates the shared mesh from the current shape config.
    pub fn rebuild_geometry(&mut self) {
        let mesh = MeshHandle::new(generate(&self.config.shape, self.config.shape.variant));
        self.field.rebuild_geometry(mesh);
    }

    /// Clears and respawns the population, abandoning any focus mode.
    pub fn respawn(&mut self) {
        if self.transition.state() != ModeState::Aggregate {
            self.transition.abort(&mut self.timeline, &mut self.halo);
            self.camera.position = self.camera.home_position;
            self.camera.target = self.camera.home_target;
            self.config.mode.single_bean_mode = false;
        }
        let mode = if self.config.field.animate_entrance {
            SpawnMode::Animated
        } else {
            SpawnMode::Static
        };
        self.field.reset(&mut self.timeline, mode);
    }

    /// Requests the focused (`true`) or aggregate view. The reflected toggle
    /// always ends up matching the mode actually in effect.
    pub fn set_focus(&mut self, focus: bool) -> ModeRequest {
        let outcome = self.transition.request(
            focus,
            TransitionParts {
                field: &mut self.field,
                camera: &self.camera,
                timeline: &mut self.timeline,
                halo: &mut self.halo,
                config: &self.config.mode,
            },
        );
        self.config.mode.single_bean_mode = self.transition.state().wants_focus();
        outcome
    }

    pub fn drag(&mut self, dx: f32, dy: f32) -> bool {
        self.transition
            .drag(dx, dy, &mut self.field, &self.config.mode)
    }

    /// Applies one parameter and dispatches whatever it invalidates.
    pub fn set_param(&mut self, key: &str, value: ParamValue) -> Result<ParamEffect> {
        let effect = params::apply(&mut self.config, key, value)?;
        match effect {
            ParamEffect::RebuildGeometry => self.rebuild_geometry(),
            ParamEffect::Respawn => {
                self.field.set_config(self.config.field.clone());
                self.reflow();
                self.respawn();
            }
            ParamEffect::RecomputeVelocity => {
                self.field.set_config(self.config.field.clone());
                self.reflow();
                self.field.recompute_velocities();
            }
            ParamEffect::NextSpawn => {
                self.field.set_config(self.config.field.clone());
                self.reflow();
            }
            ParamEffect::ToggleMode => {
                let focus = self.config.mode.single_bean_mode;
                self.set_focus(focus);
            }
            ParamEffect::UpdateStyle | ParamEffect::UpdateHalo | ParamEffect::None => {}
        }
        tracing::debug!(key, ?effect, "parameter applied");
        Ok(effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ShapeConfig;

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.shape = ShapeConfig {
            segments_u: 6,
            segments_v: 6,
            ..ShapeConfig::default()
        };
        config.field.bean_count = 12;
        config
    }

    fn context() -> RenderContext {
        RenderContext::with_seed(small_config(), Viewport::new(1280, 720), 99).unwrap()
    }

    fn run(ctx: &mut RenderContext, seconds: f32) {
        for _ in 0..(seconds * 60.0).ceil() as usize {
            ctx.frame(1.0 / 60.0);
        }
    }

    #[test]
    fn mount_without_viewport_is_a_no_op() {
        let ctx = RenderContext::mount(small_config(), None, StdRng::seed_from_u64(1)).unwrap();
        assert!(ctx.is_none());
    }

    #[test]
    fn entrance_pops_instances_in() {
        let mut ctx = context();
        assert!(ctx.field().instances().iter().all(|b| b.scale == 0.0));
        run(&mut ctx, 3.0);
        for bean in ctx.field().instances() {
            assert!((bean.scale - bean.target_scale).abs() < 1e-5);
        }
        assert!(ctx.timeline().is_empty());
        assert_eq!(ctx.frame_index(), 180);
        assert!(ctx.halo().elapsed > 2.9);
    }

    #[test]
    fn camera_projects_origin_to_centre() {
        let camera = Camera::new(&CameraConfig::default(), 1.5);
        let ndc = camera.project_to_ndc(Vec3::ZERO);
        assert!(ndc.truncate().length() < 1e-5);
        let right = camera.project_to_ndc(Vec3::new(2.0, 0.0, 0.0));
        assert!(right.x > 0.0);
    }

    #[test]
    fn points_behind_the_camera_do_not_project() {
        let camera = Camera::new(&CameraConfig::default(), 1.5);
        assert!(camera.project_in_front(Vec3::new(0.5, 0.0, 0.0)).is_some());
        assert!(camera.project_in_front(camera.position).is_none());
        assert!(camera.project_in_front(camera.position + Vec3::Z).is_none());
    }

    #[test]
    fn resize_reflows_spread_and_axis() {
        let mut ctx = context();
        assert_eq!(ctx.viewport().breathe_axis(), BreatheAxis::Horizontal);
        let wide = ctx.field().bounds().spread_x;

        ctx.resize(400, 800);
        assert_eq!(ctx.viewport().breathe_axis(), BreatheAxis::Vertical);
        assert!((ctx.camera().aspect - 0.5).abs() < 1e-6);
        assert!((ctx.field().bounds().spread_x - wide * 0.5).abs() < 1e-5);
    }

    #[test]
    fn shape_change_swaps_the_mesh() {
        let mut ctx = context();
        let generation = ctx.field().mesh().generation();
        let effect = ctx.set_param("beanScaleX", ParamValue::Number(0.9)).unwrap();
        assert_eq!(effect, ParamEffect::RebuildGeometry);
        assert!(ctx.field().mesh().generation() > generation);
    }

    #[test]
    fn count_change_respawns() {
        let mut ctx = context();
        ctx.set_param("beanCount", ParamValue::Number(20.0)).unwrap();
        assert_eq!(ctx.field().len(), 20);
    }

    #[test]
    fn focus_toggle_drives_the_controller_and_reverts_when_busy() {
        let mut ctx = context();
        run(&mut ctx, 3.0);

        ctx.set_param("singleBeanMode", ParamValue::Bool(true)).unwrap();
        assert_eq!(ctx.mode(), ModeState::EnteringFocus);
        assert!(!ctx.halo_visible());

        // Toggling back mid-transition is dropped and the toggle reverts.
        ctx.set_param("singleBeanMode", ParamValue::Bool(false)).unwrap();
        assert_eq!(ctx.mode(), ModeState::EnteringFocus);
        assert!(ctx.config().mode.single_bean_mode);

        run(&mut ctx, 1.5);
        assert_eq!(ctx.mode(), ModeState::Focused);
        assert!(ctx.drag(5.0, 0.0));

        ctx.set_param("singleBeanMode", ParamValue::Bool(false)).unwrap();
        assert_eq!(ctx.mode(), ModeState::ExitingFocus);
        run(&mut ctx, 1.5);
        assert_eq!(ctx.mode(), ModeState::Aggregate);
        assert!(ctx.halo_visible());
    }

    #[test]
    fn respawn_while_focused_returns_to_aggregate() {
        let mut ctx = context();
        run(&mut ctx, 3.0);
        ctx.set_focus(true);
        run(&mut ctx, 1.5);
        assert_eq!(ctx.mode(), ModeState::Focused);

        ctx.set_param("spreadX", ParamValue::Number(8.0)).unwrap();
        assert_eq!(ctx.mode(), ModeState::Aggregate);
        assert!(!ctx.config().mode.single_bean_mode);
        assert_eq!(ctx.camera().position, ctx.camera().home_position);
        assert!(ctx.halo().active);
    }
}
