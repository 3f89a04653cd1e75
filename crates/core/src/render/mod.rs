use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::{
    field::BeanInstance,
    geometry::Mesh,
    halo::{EdgeHalo, FrameBuffer},
    scene::{Camera, RenderContext, MIN_CLIP_W},
    shading::{shade, Fragment, Palette, StyleConfig},
    Result,
};

/// Software rasteriser for a [`RenderContext`].
///
/// Beans are drawn with a depth buffer onto a transparent background, then the
/// edge halo runs over the result when the scene has it enabled.
#[derive(Debug, Clone)]
pub struct RenderGraph {
    background: [f32; 4],
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            background: [0.0; 4],
        }
    }

    /// Background colour for uncovered pixels. Its alpha should stay below 1
    /// or the halo has no silhouettes to find.
    pub fn with_background(mut self, background: [f32; 4]) -> Self {
        self.background = background;
        self
    }

    pub fn draw(&self, ctx: &RenderContext) -> Result<FrameBuffer> {
        let viewport = ctx.viewport();
        let mut target = RasterTarget::new(
            viewport.width as usize,
            viewport.height as usize,
            self.background,
        )?;

        let camera = ctx.camera();
        let view_projection = camera.view_projection();
        let field = ctx.field();
        let style = &ctx.config().style;
        let mut drawn = 0usize;
        for instance in field.instances().iter().filter(|i| i.is_visible()) {
            let palette = Palette::resolve(style, instance.overrides.as_ref());
            let pass = InstancePass {
                mesh: field.mesh(),
                instance,
                camera,
                view_projection,
                style,
                palette: &palette,
            };
            pass.rasterize(&mut target);
            drawn += 1;
        }
        tracing::trace!(drawn, frame = ctx.frame_index(), "beans rasterised");

        let frame = target.color;
        if ctx.halo_visible() {
            let halo = EdgeHalo::new(
                &ctx.config().halo,
                ctx.halo().elapsed,
                viewport.breathe_axis(),
            );
            Ok(halo.apply(&frame))
        } else {
            Ok(frame)
        }
    }
}

struct RasterTarget {
    color: FrameBuffer,
    depth: Vec<f32>,
}

impl RasterTarget {
    fn new(width: usize, height: usize, background: [f32; 4]) -> Result<Self> {
        let color = FrameBuffer::filled(width, height, background)?;
        Ok(Self {
            color,
            depth: vec![f32::INFINITY; width * height],
        })
    }
}

/// Vertex after transformation, with the attributes the fragment needs.
#[derive(Clone, Copy)]
struct ProjectedVertex {
    screen: Vec2,
    depth: f32,
    inv_w: f32,
    world: Vec3,
    normal: Vec3,
    param: Vec2,
    local_z: f32,
}

struct InstancePass<'a> {
    mesh: &'a Mesh,
    instance: &'a BeanInstance,
    camera: &'a Camera,
    view_projection: Mat4,
    style: &'a StyleConfig,
    palette: &'a Palette,
}

impl InstancePass<'_> {
    fn rasterize(&self, target: &mut RasterTarget) {
        let model = self.instance.model_matrix();
        let orientation = self.instance.orientation();
        let size = Vec2::new(target.color.width() as f32, target.color.height() as f32);

        let projected: Vec<Option<ProjectedVertex>> = (0..self.mesh.vertex_count())
            .map(|i| {
                let local = Vec3::from(self.mesh.positions[i]);
                let world = model.transform_point3(local);
                let clip = self.view_projection * Vec4::from((world, 1.0));
                if clip.w < MIN_CLIP_W {
                    return None;
                }
                let ndc = clip.truncate() / clip.w;
                Some(ProjectedVertex {
                    screen: Vec2::new(
                        (ndc.x * 0.5 + 0.5) * size.x,
                        (0.5 - ndc.y * 0.5) * size.y,
                    ),
                    depth: ndc.z,
                    inv_w: 1.0 / clip.w,
                    world,
                    normal: orientation * Vec3::from(self.mesh.normals[i]),
                    param: Vec2::from(self.mesh.params[i]),
                    local_z: local.z,
                })
            })
            .collect();

        for [a, b, c] in self.mesh.triangles() {
            // Triangles crossing the camera plane are dropped whole.
            if let (Some(a), Some(b), Some(c)) =
                (projected[a], projected[b], projected[c])
            {
                self.fill_triangle(target, [a, b, c]);
            }
        }
    }

    fn fill_triangle(&self, target: &mut RasterTarget, tri: [ProjectedVertex; 3]) {
        let [a, b, c] = tri;
        let area = edge(a.screen, b.screen, c.screen);
        if area.abs() <= f32::EPSILON {
            return;
        }

        let width = target.color.width();
        let height = target.color.height();
        let min = a.screen.min(b.screen).min(c.screen).floor().max(Vec2::ZERO);
        let max = a
            .screen
            .max(b.screen)
            .max(c.screen)
            .ceil()
            .min(Vec2::new(width as f32, height as f32));
        if min.x >= max.x || min.y >= max.y {
            return;
        }

        for y in min.y as usize..max.y as usize {
            for x in min.x as usize..max.x as usize {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(b.screen, c.screen, p) / area;
                let w1 = edge(c.screen, a.screen, p) / area;
                let w2 = edge(a.screen, b.screen, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let depth = w0 * a.depth + w1 * b.depth + w2 * c.depth;
                let slot = y * width + x;
                if !(-1.0..=1.0).contains(&depth) || depth >= target.depth[slot] {
                    continue;
                }

                // Perspective-correct weights.
                let pw = Vec3::new(w0 * a.inv_w, w1 * b.inv_w, w2 * c.inv_w);
                let pw = pw / (pw.x + pw.y + pw.z);
                let lerp3 = |va: Vec3, vb: Vec3, vc: Vec3| va * pw.x + vb * pw.y + vc * pw.z;

                let world = lerp3(a.world, b.world, c.world);
                let fragment = Fragment {
                    normal: lerp3(a.normal, b.normal, c.normal),
                    view_dir: self.camera.position - world,
                    param: a.param * pw.x + b.param * pw.y + c.param * pw.z,
                    local_z: a.local_z * pw.x + b.local_z * pw.y + c.local_z * pw.z,
                };
                let color = shade(&fragment, self.style, self.palette);

                target.depth[slot] = depth;
                target.color.set(x, y, [color.r, color.g, color.b, 1.0]);
            }
        }
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b - a).perp_dot(p - a)
}
