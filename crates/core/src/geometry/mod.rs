//! Parametric bean mesh generation.
//!
//! Both generators walk the same `(u, v)` grid over `[-1, 1]²`: `v` runs along
//! the bean's length (the y axis) and `u` around its cross-section, with
//! `u = 0` on the +Z face where the crease sits. The raw grid coordinate is
//! emitted per vertex so the shader can place the crease without relying on a
//! texture mapping.

use std::{
    f32::consts::PI,
    fmt::Write as _,
    ops::Deref,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{BeanError, Result};

/// Smallest tessellation accepted along either grid axis.
pub const MIN_SEGMENTS: u32 = 3;

const SUPERELLIPSE_EXPONENT: f32 = 2.5;

/// Which parametric surface the generator should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeanVariant {
    /// Grooved ellipsoid.
    Classic,
    /// Superellipse cross-section with kidney curve, bulge and pointed ends.
    #[default]
    Superellipse,
}

impl BeanVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            BeanVariant::Classic => "classic",
            BeanVariant::Superellipse => "superellipse",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "classic" => Some(BeanVariant::Classic),
            "superellipse" => Some(BeanVariant::Superellipse),
            _ => None,
        }
    }
}

/// Shape parameters for the bean envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShapeConfig {
    pub variant: BeanVariant,
    pub scale_x: f32,
    pub scale_y: f32,
    pub scale_z: f32,
    pub groove_depth: f32,
    pub groove_width: f32,
    pub kidney_amount: f32,
    pub kidney_offset: f32,
    pub back_bulge: f32,
    pub end_pinch: f32,
    pub end_pointiness: f32,
    pub segments_u: u32,
    pub segments_v: u32,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            variant: BeanVariant::default(),
            scale_x: 0.7,
            scale_y: 1.0,
            scale_z: 0.55,
            groove_depth: 0.12,
            groove_width: 0.25,
            kidney_amount: 0.08,
            kidney_offset: 0.0,
            back_bulge: 0.15,
            end_pinch: 0.2,
            end_pointiness: 0.4,
            segments_u: 48,
            segments_v: 32,
        }
    }
}

impl ShapeConfig {
    /// Checks the documented domain: every field finite, positive envelope.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("beanScaleX", self.scale_x),
            ("beanScaleY", self.scale_y),
            ("beanScaleZ", self.scale_z),
            ("grooveDepth", self.groove_depth),
            ("grooveWidth", self.groove_width),
            ("kidneyAmount", self.kidney_amount),
            ("kidneyOffset", self.kidney_offset),
            ("backBulge", self.back_bulge),
            ("endPinch", self.end_pinch),
            ("endPointiness", self.end_pointiness),
        ];
        for (key, value) in fields {
            if !value.is_finite() {
                return Err(BeanError::invalid(key, "must be finite"));
            }
        }
        for (key, value) in &fields[..3] {
            if *value <= 0.0 {
                return Err(BeanError::invalid(*key, "must be positive"));
            }
        }
        if self.end_pointiness < 0.0 {
            return Err(BeanError::invalid("endPointiness", "must not be negative"));
        }
        if self.segments_u < MIN_SEGMENTS || self.segments_v < MIN_SEGMENTS {
            return Err(BeanError::invalid(
                "segments",
                format!("tessellation must be at least {MIN_SEGMENTS}x{MIN_SEGMENTS}"),
            ));
        }
        Ok(())
    }
}

/// Triangulated bean surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    /// Raw parametric `(u, v)` per vertex, both in `[-1, 1]`.
    pub params: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|tri| [tri[0] as usize, tri[1] as usize, tri[2] as usize])
    }

    /// Axis-aligned bounds as `(min, max)`.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        self.positions.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| {
                let p = Vec3::from(*p);
                (min.min(p), max.max(p))
            },
        )
    }

    /// Wavefront OBJ text with the parametric coordinates in `vt` slots.
    pub fn to_obj(&self) -> String {
        let mut out = String::with_capacity(self.positions.len() * 64);
        out.push_str("# bean mesh\n");
        for p in &self.positions {
            let _ = writeln!(out, "v {} {} {}", p[0], p[1], p[2]);
        }
        for uv in &self.params {
            let _ = writeln!(out, "vt {} {}", uv[0], uv[1]);
        }
        for n in &self.normals {
            let _ = writeln!(out, "vn {} {} {}", n[0], n[1], n[2]);
        }
        for [a, b, c] in self.triangles() {
            let (a, b, c) = (a + 1, b + 1, c + 1);
            let _ = writeln!(out, "f {a}/{a}/{a} {b}/{b}/{b} {c}/{c}/{c}");
        }
        out
    }
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Shared, immutable reference to a generated mesh.
///
/// Every live instance draws through the same handle; a rebuild produces a new
/// handle with a higher generation and replaces the old one in one assignment.
#[derive(Debug, Clone)]
pub struct MeshHandle {
    mesh: Arc<Mesh>,
    generation: u64,
}

impl MeshHandle {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh: Arc::new(mesh),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ptr_eq(&self, other: &MeshHandle) -> bool {
        Arc::ptr_eq(&self.mesh, &other.mesh)
    }
}

impl Deref for MeshHandle {
    type Target = Mesh;

    fn deref(&self) -> &Mesh {
        &self.mesh
    }
}

/// Builds the bean surface for `shape` using the requested generator.
///
/// Tessellation below [`MIN_SEGMENTS`] is clamped; all other fields are
/// expected to be finite (see [`ShapeConfig::validate`]).
pub fn generate(shape: &ShapeConfig, variant: BeanVariant) -> Mesh {
    let segments_u = shape.segments_u.max(MIN_SEGMENTS);
    let segments_v = shape.segments_v.max(MIN_SEGMENTS);
    let columns = segments_u + 1;

    let vertex_total = (columns * (segments_v + 1)) as usize;
    let mut positions = Vec::with_capacity(vertex_total);
    let mut params = Vec::with_capacity(vertex_total);

    for iv in 0..=segments_v {
        let v = -1.0 + 2.0 * iv as f32 / segments_v as f32;
        for iu in 0..=segments_u {
            let u = -1.0 + 2.0 * iu as f32 / segments_u as f32;
            let point = match variant {
                BeanVariant::Classic => classic_point(shape, u, v),
                BeanVariant::Superellipse => superellipse_point(shape, u, v),
            };
            positions.push(point.to_array());
            params.push([u, v]);
        }
    }

    let mut indices = Vec::with_capacity((segments_u * segments_v * 6) as usize);
    for iv in 0..segments_v {
        for iu in 0..segments_u {
            let a = iv * columns + iu;
            let b = a + 1;
            let c = a + columns;
            let d = c + 1;
            indices.extend_from_slice(&[a, b, c, b, d, c]);
        }
    }

    let normals = vertex_normals(&positions, &indices);
    Mesh {
        positions,
        normals,
        params,
        indices,
    }
}

fn classic_point(shape: &ShapeConfig, u: f32, v: f32) -> Vec3 {
    let v = v.clamp(-1.0, 1.0);
    let theta = v.acos();
    let phi = u * PI;

    let mut x = shape.scale_x * theta.sin() * phi.sin();
    let y = shape.scale_y * v;
    let mut z = shape.scale_z * theta.sin() * phi.cos();

    if z > 0.0 {
        let mask = smoothstep(shape.groove_width, 0.0, u.abs());
        z -= shape.groove_depth * mask * (1.0 - 0.4 * v * v);
        x *= 1.0 - mask * 0.1;
    }

    z *= 1.0 + 0.03 * (v * PI * 0.5).sin();
    let taper = 1.0 - 0.08 * v.abs();
    Vec3::new(x * taper, y, z * taper)
}

fn superellipse_point(shape: &ShapeConfig, u: f32, v: f32) -> Vec3 {
    let v = v.clamp(-1.0, 1.0);
    let phi = u * PI;
    let cross_x = signed_pow(phi.sin(), 2.0 / SUPERELLIPSE_EXPONENT);
    let cross_z = signed_pow(phi.cos(), 2.0 / SUPERELLIPSE_EXPONENT);

    let pointiness = shape.end_pointiness.max(0.0);
    let base_radius = (1.0 - v.abs().powf(2.0 + pointiness))
        .max(0.0)
        .powf(0.5 + 0.5 * pointiness);

    let mut x = shape.scale_x * base_radius * cross_x;
    let y = shape.scale_y * v;
    let mut z = shape.scale_z * base_radius * cross_z;

    x += shape.kidney_amount * ((v - shape.kidney_offset) * 0.9 * PI).sin() * base_radius;

    if z < 0.0 {
        z *= 1.0 + shape.back_bulge * (1.0 - 0.5 * v * v);
    }

    x *= 1.0 - shape.end_pinch * v.abs().powi(3);

    if z > 0.0 {
        let mask = smoothstep(shape.groove_width, 0.0, u.abs());
        z -= shape.groove_depth * mask * (1.0 - 0.4 * v * v) * base_radius;
        x *= 1.0 - mask * 0.1;
    }

    z *= 1.0 + 0.03 * (v * PI * 0.5).sin();
    Vec3::new(x, y, z)
}

/// Area-weighted average of adjacent face normals.
fn vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accum = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let pa = Vec3::from(positions[a]);
        let pb = Vec3::from(positions[b]);
        let pc = Vec3::from(positions[c]);
        // Unnormalised cross product weights by twice the triangle area.
        let face = (pb - pa).cross(pc - pa);
        accum[a] += face;
        accum[b] += face;
        accum[c] += face;
    }

    accum
        .into_iter()
        .zip(positions)
        .map(|(n, p)| {
            n.try_normalize()
                .or_else(|| Vec3::from(*p).try_normalize())
                .unwrap_or(Vec3::Y)
                .to_array()
        })
        .collect()
}

/// Hermite smoothstep that also accepts reversed edges (`edge0 > edge1`).
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if (edge1 - edge0).abs() <= f32::EPSILON {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn signed_pow(value: f32, exponent: f32) -> f32 {
    value.signum() * value.abs().powf(exponent)
}
