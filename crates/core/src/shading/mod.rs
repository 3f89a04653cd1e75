//! Cel-shading model evaluated per fragment.

use std::fmt;

use glam::{Vec2, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{BeanError, Result};

/// Linear RGB color with channels in `[0, 1]`. Serialised as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(BeanError::msg(format!("`{hex}` is not a #rrggbb color")));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map(|c| c as f32 / 255.0)
                .map_err(|_| BeanError::msg(format!("`{hex}` is not a #rrggbb color")))
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.to_rgb8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }

    pub fn from_vec3(v: Vec3) -> Self {
        Self::rgb(v.x, v.y, v.z)
    }
}

impl TryFrom<String> for Color {
    type Error = BeanError;

    fn try_from(value: String) -> Result<Self> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_hex()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Material parameters shared by every bean unless overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StyleConfig {
    pub toon_enabled: bool,
    pub rim_enabled: bool,
    pub specular_enabled: bool,
    pub color_enabled: bool,
    pub toon_bands: u32,
    pub rim_power: f32,
    pub rim_intensity: f32,
    pub specular_power: f32,
    pub specular_threshold: f32,
    pub specular_intensity: f32,
    pub crease_width: f32,
    pub crease_length: f32,
    pub crease_radius: f32,
    pub light_dir: Vec3,
    pub base_color: Color,
    pub highlight_color: Color,
    pub crease_color: Color,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            toon_enabled: true,
            rim_enabled: true,
            specular_enabled: true,
            color_enabled: true,
            toon_bands: 3,
            rim_power: 3.0,
            rim_intensity: 0.45,
            specular_power: 32.0,
            specular_threshold: 0.5,
            specular_intensity: 0.6,
            crease_width: 0.03,
            crease_length: 0.7,
            crease_radius: 0.02,
            light_dir: Vec3::new(1.0, 1.0, 1.0),
            base_color: Color::rgb(0.435, 0.306, 0.216),
            highlight_color: Color::rgb(0.961, 0.902, 0.827),
            crease_color: Color::rgb(0.169, 0.102, 0.063),
        }
    }
}

/// Per-instance color overrides used by the "blend" color mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleOverrides {
    pub base_color: Color,
    pub highlight_color: Color,
    pub crease_color: Color,
}

/// Color themes instances draw from when blending.
pub const COLOR_THEMES: [StyleOverrides; 5] = [
    StyleOverrides {
        base_color: Color::rgb(0.435, 0.306, 0.216),
        highlight_color: Color::rgb(0.961, 0.902, 0.827),
        crease_color: Color::rgb(0.169, 0.102, 0.063),
    },
    StyleOverrides {
        base_color: Color::rgb(0.612, 0.424, 0.267),
        highlight_color: Color::rgb(1.0, 0.945, 0.851),
        crease_color: Color::rgb(0.278, 0.176, 0.110),
    },
    StyleOverrides {
        base_color: Color::rgb(0.310, 0.196, 0.145),
        highlight_color: Color::rgb(0.890, 0.780, 0.667),
        crease_color: Color::rgb(0.094, 0.055, 0.039),
    },
    StyleOverrides {
        base_color: Color::rgb(0.545, 0.604, 0.357),
        highlight_color: Color::rgb(0.941, 0.976, 0.847),
        crease_color: Color::rgb(0.259, 0.306, 0.141),
    },
    StyleOverrides {
        base_color: Color::rgb(0.878, 0.471, 0.306),
        highlight_color: Color::rgb(1.0, 0.894, 0.804),
        crease_color: Color::rgb(0.412, 0.165, 0.090),
    },
];

impl StyleOverrides {
    pub fn random_theme<R: Rng + ?Sized>(rng: &mut R) -> Self {
        COLOR_THEMES[rng.gen_range(0..COLOR_THEMES.len())]
    }
}

/// Interpolated surface data for one fragment.
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub normal: Vec3,
    /// Direction from the surface towards the eye.
    pub view_dir: Vec3,
    /// Raw parametric grid coordinate.
    pub param: Vec2,
    /// Object-space z; positive on the creased face.
    pub local_z: f32,
}

/// Colors actually used for a fragment after overrides and the ink toggle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub base: Color,
    pub highlight: Color,
    pub crease: Color,
}

impl Palette {
    pub fn resolve(style: &StyleConfig, overrides: Option<&StyleOverrides>) -> Self {
        if !style.color_enabled {
            return Self {
                base: Color::BLACK,
                highlight: Color::WHITE,
                crease: Color::WHITE,
            };
        }
        match overrides {
            Some(o) => Self {
                base: o.base_color,
                highlight: o.highlight_color,
                crease: o.crease_color,
            },
            None => Self {
                base: style.base_color,
                highlight: style.highlight_color,
                crease: style.crease_color,
            },
        }
    }
}

/// Evaluates the toon/rim/specular/crease stack for a single fragment.
pub fn shade(fragment: &Fragment, style: &StyleConfig, palette: &Palette) -> Color {
    let n = fragment.normal.normalize_or_zero();
    let v = fragment.view_dir.normalize_or_zero();
    let l = style.light_dir.normalize_or_zero();
    let base = palette.base.to_vec3();
    let highlight = palette.highlight.to_vec3();

    let mut color = if style.toon_enabled {
        let level = toon_level(n.dot(l), style.toon_bands);
        (base * 0.6).lerp(base, level)
    } else {
        base
    };

    if style.rim_enabled {
        let rim = (1.0 - n.dot(v).max(0.0)).powf(style.rim_power) * style.rim_intensity;
        color += highlight * rim;
    }

    if style.specular_enabled {
        let h = (l + v).normalize_or_zero();
        let spec = n.dot(h).max(0.0).powf(style.specular_power);
        color += highlight * step(style.specular_threshold, spec) * style.specular_intensity;
    }

    if fragment.local_z > 0.0
        && crease_distance(
            fragment.param,
            style.crease_width,
            style.crease_length,
            style.crease_radius,
        ) <= 0.0
    {
        color = palette.crease.to_vec3();
    }

    Color::from_vec3(color.clamp(Vec3::ZERO, Vec3::ONE))
}

/// Quantised light level in `[0, 1]`.
pub fn toon_level(n_dot_l: f32, bands: u32) -> f32 {
    let bands = bands.max(1) as f32;
    (((n_dot_l + 1.0) * 0.5) * bands).floor() / bands
}

/// Signed distance from `p` to a rounded rectangle centred on the origin.
pub fn crease_distance(p: Vec2, half_width: f32, half_length: f32, radius: f32) -> f32 {
    let half_extents = Vec2::new(half_width, half_length);
    let q = p.abs() - half_extents + Vec2::splat(radius);
    q.max(Vec2::ZERO).length() + q.x.max(q.y).min(0.0) - radius
}

fn step(edge: f32, x: f32) -> f32 {
    if x < edge {
        0.0
    } else {
        1.0
    }
}
