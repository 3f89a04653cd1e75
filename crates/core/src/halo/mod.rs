//! Chromatic edge halo applied to the composited frame.
//!
//! The pass looks for alpha discontinuities: a pixel picks up a cyan, magenta
//! or yellow fringe when a neighbour sampled along one of three rotating
//! directions is more opaque than the pixel itself. Beans are drawn over a
//! transparent background, so those discontinuities are their silhouettes.

use std::f32::consts::TAU;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::{BeanError, Result};

const DIRECTION_OFFSETS: [f32; 3] = [0.0, 2.094, 4.189];
const CYAN: Vec3 = Vec3::new(0.0, 1.0, 1.0);
const MAGENTA: Vec3 = Vec3::new(1.0, 0.0, 1.0);
const YELLOW: Vec3 = Vec3::new(1.0, 1.0, 0.0);
const EDGE_ALPHA: f32 = 0.85;
const INK_EPSILON: f32 = 0.01;

/// How fringe colors are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaloBlend {
    /// Cyan/magenta/yellow added together, weighted by edge strength.
    #[default]
    Additive,
    /// Ink look: each channel darkened by its edge strength.
    Subtractive,
}

/// Which screen axis drives the breathing wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreatheAxis {
    #[default]
    Horizontal,
    Vertical,
}

/// Post-process parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HaloConfig {
    pub enabled: bool,
    /// Sample offset in pixels.
    pub offset: f32,
    pub rotation_speed: f32,
    pub breathe_enabled: bool,
    pub breathe_intensity: f32,
    pub breathe_speed: f32,
    pub breathe_wave_freq: f32,
    pub blend: HaloBlend,
}

impl Default for HaloConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            offset: 3.0,
            rotation_speed: 0.5,
            breathe_enabled: false,
            breathe_intensity: 0.3,
            breathe_speed: 2.0,
            breathe_wave_freq: 1.5,
            blend: HaloBlend::Additive,
        }
    }
}

/// Runtime state of the halo pass: accumulated time and whether the current
/// view mode wants the effect at all.
#[derive(Debug, Clone, PartialEq)]
pub struct HaloState {
    pub elapsed: f32,
    pub active: bool,
}

impl Default for HaloState {
    fn default() -> Self {
        Self {
            elapsed: 0.0,
            active: true,
        }
    }
}

impl HaloState {
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt.max(0.0);
    }
}

/// Straight (non-premultiplied) RGBA frame, row-major from the top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: usize,
    height: usize,
    pixels: Vec<[f32; 4]>,
}

impl FrameBuffer {
    /// Fully transparent frame.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        Self::filled(width, height, [0.0; 4])
    }

    pub fn filled(width: usize, height: usize, pixel: [f32; 4]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BeanError::Render(format!(
                "frame dimensions must be non-zero (got {width}x{height})"
            )));
        }
        Ok(Self {
            width,
            height,
            pixels: vec![pixel; width * height],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> [f32; 4] {
        self.pixels[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, pixel: [f32; 4]) {
        self.pixels[y * self.width + x] = pixel;
    }

    /// Nearest-pixel lookup with clamp-to-edge addressing.
    fn sample(&self, x: f32, y: f32) -> [f32; 4] {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let sx = x.round().clamp(0.0, max_x) as usize;
        let sy = y.round().clamp(0.0, max_y) as usize;
        self.get(sx, sy)
    }

    /// 8-bit RGBA bytes, suitable for image encoders.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }
}

/// Fringe contribution computed for one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FringeSample {
    /// Edge strength per sampling direction (cyan, magenta, yellow).
    pub edges: [f32; 3],
    pub color: Vec3,
}

impl FringeSample {
    pub fn max_edge(&self) -> f32 {
        self.edges[0].max(self.edges[1]).max(self.edges[2])
    }
}

/// Edge halo pass bound to a config, a time value and a breathing axis.
#[derive(Debug, Clone)]
pub struct EdgeHalo<'a> {
    config: &'a HaloConfig,
    time: f32,
    axis: BreatheAxis,
}

impl<'a> EdgeHalo<'a> {
    pub fn new(config: &'a HaloConfig, time: f32, axis: BreatheAxis) -> Self {
        Self { config, time, axis }
    }

    /// Sampling offsets (in pixels) for a pixel at normalised screen `coord`.
    pub fn offsets(&self, coord: Vec2) -> [Vec2; 3] {
        let along = match self.axis {
            BreatheAxis::Horizontal => coord.x,
            BreatheAxis::Vertical => coord.y,
        };
        let breathe = if self.config.breathe_enabled {
            1.0 + self.config.breathe_intensity
                * (along * self.config.breathe_wave_freq * TAU
                    - self.time * self.config.breathe_speed)
                    .sin()
        } else {
            1.0
        };
        let magnitude = self.config.offset * breathe;
        let base = self.time * self.config.rotation_speed;
        DIRECTION_OFFSETS.map(|angle| Vec2::from_angle(base + angle) * magnitude)
    }

    pub fn fringe_at(&self, frame: &FrameBuffer, x: usize, y: usize) -> FringeSample {
        let center_alpha = frame.get(x, y)[3];
        let coord = Vec2::new(
            (x as f32 + 0.5) / frame.width() as f32,
            (y as f32 + 0.5) / frame.height() as f32,
        );
        let offsets = self.offsets(coord);
        let edges = offsets.map(|offset| {
            let sampled = frame.sample(x as f32 + offset.x, y as f32 + offset.y);
            (sampled[3] - center_alpha).max(0.0)
        });

        let color = match self.config.blend {
            HaloBlend::Additive => CYAN * edges[0] + MAGENTA * edges[1] + YELLOW * edges[2],
            HaloBlend::Subtractive => {
                // Zeroed on the summed strength, not per channel.
                if edges.iter().sum::<f32>() < INK_EPSILON {
                    Vec3::ZERO
                } else {
                    Vec3::new(1.0 - edges[0], 1.0 - edges[1], 1.0 - edges[2])
                }
            }
        };
        FringeSample { edges, color }
    }

    /// Produces the fringed frame.
    pub fn apply(&self, frame: &FrameBuffer) -> FrameBuffer {
        let mut out = frame.clone();
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                let center = frame.get(x, y);
                let alpha = center[3];
                let fringe = self.fringe_at(frame, x, y);
                let rgb = fringe
                    .color
                    .lerp(Vec3::new(center[0], center[1], center[2]), alpha)
                    .clamp(Vec3::ZERO, Vec3::ONE);
                let out_alpha = alpha.max(EDGE_ALPHA * fringe.max_edge());
                out.set(x, y, [rgb.x, rgb.y, rgb.z, out_alpha]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(offset: f32) -> HaloConfig {
        HaloConfig {
            offset,
            rotation_speed: 0.0,
            ..HaloConfig::default()
        }
    }

    /// Left half transparent, right half opaque white; step between x=15 and x=16.
    fn step_frame() -> FrameBuffer {
        let mut frame = FrameBuffer::new(32, 8).unwrap();
        for y in 0..8 {
            for x in 16..32 {
                frame.set(x, y, [1.0, 1.0, 1.0, 1.0]);
            }
        }
        frame
    }

    #[test]
    fn uniform_alpha_has_no_fringe() {
        let cfg = config(4.0);
        let halo = EdgeHalo::new(&cfg, 1.3, BreatheAxis::Horizontal);
        let frame = FrameBuffer::filled(16, 16, [0.2, 0.4, 0.6, 0.5]).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(halo.fringe_at(&frame, x, y).max_edge(), 0.0);
            }
        }
        let out = halo.apply(&frame);
        assert_eq!(out.get(3, 3)[3], 0.5);
    }

    #[test]
    fn fringe_stays_within_offset_of_the_step() {
        let offset = 3.0;
        let cfg = config(offset);
        let halo = EdgeHalo::new(&cfg, 0.0, BreatheAxis::Horizontal);
        let frame = step_frame();

        let mut seen_fringe = false;
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                let edge = halo.fringe_at(&frame, x, y).max_edge();
                if edge > 0.0 {
                    seen_fringe = true;
                    assert!(x < 16, "fringe on the opaque side at {x}");
                    assert!(16 - x <= offset as usize, "fringe too far out at {x}");
                }
            }
        }
        assert!(seen_fringe);
    }

    #[test]
    fn additive_fringe_colors_the_transparent_side() {
        let cfg = config(3.0);
        let halo = EdgeHalo::new(&cfg, 0.0, BreatheAxis::Horizontal);
        let out = halo.apply(&step_frame());
        // Direction 0 points along +x at t = 0, so cyan lands left of the step.
        let pixel = out.get(14, 4);
        assert!((pixel[3] - EDGE_ALPHA).abs() < 1e-6);
        assert!(pixel[1] > 0.5 && pixel[2] > 0.5);
        // Opaque pixels are untouched.
        assert_eq!(out.get(20, 4), [1.0, 1.0, 1.0, 1.0]);
        // Far from the edge nothing changes.
        assert_eq!(out.get(2, 4)[3], 0.0);
    }

    #[test]
    fn subtractive_fringe_inks_edges_and_zeroes_elsewhere() {
        let cfg = HaloConfig {
            blend: HaloBlend::Subtractive,
            ..config(3.0)
        };
        let halo = EdgeHalo::new(&cfg, 0.0, BreatheAxis::Horizontal);
        let frame = step_frame();
        let edge = halo.fringe_at(&frame, 14, 4);
        assert_eq!(edge.color.x, 0.0);
        let far = halo.fringe_at(&frame, 2, 4);
        assert_eq!(far.color, Vec3::ZERO);
    }

    #[test]
    fn breathing_modulates_offset_along_axis() {
        let cfg = HaloConfig {
            breathe_enabled: true,
            breathe_intensity: 0.5,
            breathe_wave_freq: 1.0,
            ..config(2.0)
        };
        let horizontal = EdgeHalo::new(&cfg, 0.0, BreatheAxis::Horizontal);
        // sin(0.25 · 2π) = 1 → magnitude 2 · 1.5.
        let peak = horizontal.offsets(Vec2::new(0.25, 0.0))[0].length();
        assert!((peak - 3.0).abs() < 1e-4);

        let vertical = EdgeHalo::new(&cfg, 0.0, BreatheAxis::Vertical);
        let flat = vertical.offsets(Vec2::new(0.25, 0.0))[0].length();
        assert!((flat - 2.0).abs() < 1e-4);
    }

    #[test]
    fn directions_rotate_with_time() {
        let cfg = HaloConfig {
            rotation_speed: 1.0,
            ..config(1.0)
        };
        let halo = EdgeHalo::new(&cfg, std::f32::consts::FRAC_PI_2, BreatheAxis::Horizontal);
        let first = halo.offsets(Vec2::ZERO)[0];
        assert!(first.x.abs() < 1e-5 && (first.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rejects_empty_frames() {
        assert!(FrameBuffer::new(0, 4).is_err());
    }

    #[test]
    fn time_accumulates_forward_only() {
        let mut state = HaloState::default();
        state.advance(0.5);
        state.advance(-1.0);
        assert_eq!(state.elapsed, 0.5);
    }
}
