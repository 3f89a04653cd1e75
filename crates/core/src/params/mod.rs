//! Typed parameter table a debug UI can iterate.
//!
//! Each [`ParamDescriptor`] names one live-tweakable field of [`AppConfig`],
//! the value kind and range it accepts, and the [`ParamEffect`] a change
//! implies. The core never depends on any particular UI binding library.

use std::{fmt, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    field::ColorMode,
    geometry::BeanVariant,
    halo::HaloBlend,
    shading::Color,
    BeanError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamGroup {
    Shape,
    Style,
    Halo,
    Field,
    Mode,
}

/// What the scene has to do after a parameter changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamEffect {
    RebuildGeometry,
    UpdateStyle,
    UpdateHalo,
    Respawn,
    RecomputeVelocity,
    /// Stored for the next spawn; nothing live changes.
    NextSpawn,
    ToggleMode,
    None,
}

/// Value carried into or out of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f32),
    Color(Color),
    Text(String),
}

impl ParamValue {
    /// Short label of the value's variant, used in error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Number(_) => "number",
            ParamValue::Color(_) => "color",
            ParamValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Number(v) => write!(f, "{v}"),
            ParamValue::Color(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Toggle,
    Number { min: f32, max: f32 },
    Count { min: u32, max: u32 },
    Color,
    Choice(&'static [&'static str]),
}

impl ParamKind {
    fn expected(&self) -> &'static str {
        match self {
            ParamKind::Toggle => "bool",
            ParamKind::Number { .. } | ParamKind::Count { .. } => "number",
            ParamKind::Color => "color",
            ParamKind::Choice(_) => "choice",
        }
    }
}

#[derive(Clone, Copy)]
enum Accessor {
    Toggle(fn(&AppConfig) -> bool, fn(&mut AppConfig, bool)),
    Number(fn(&AppConfig) -> f32, fn(&mut AppConfig, f32)),
    Count(fn(&AppConfig) -> u32, fn(&mut AppConfig, u32)),
    Color(fn(&AppConfig) -> Color, fn(&mut AppConfig, Color)),
    Choice(fn(&AppConfig) -> &'static str, fn(&mut AppConfig, &str) -> bool),
}

#[derive(Clone, Copy)]
pub struct ParamDescriptor {
    pub key: &'static str,
    pub group: ParamGroup,
    pub kind: ParamKind,
    pub effect: ParamEffect,
    access: Accessor,
}

impl fmt::Debug for ParamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamDescriptor")
            .field("key", &self.key)
            .field("group", &self.group)
            .field("kind", &self.kind)
            .field("effect", &self.effect)
            .finish()
    }
}

impl ParamDescriptor {
    pub fn get(&self, config: &AppConfig) -> ParamValue {
        match self.access {
            Accessor::Toggle(get, _) => ParamValue::Bool(get(config)),
            Accessor::Number(get, _) => ParamValue::Number(get(config)),
            Accessor::Count(get, _) => ParamValue::Number(get(config) as f32),
            Accessor::Color(get, _) => ParamValue::Color(get(config)),
            Accessor::Choice(get, _) => ParamValue::Text(get(config).to_string()),
        }
    }

    /// Validates `value` against the descriptor and writes it into `config`.
    /// Values arriving as text (e.g. from a command line) are parsed first.
    pub fn set(&self, config: &mut AppConfig, value: ParamValue) -> Result<()> {
        let value = self.coerce(value)?;
        match (self.access, self.kind, value) {
            (Accessor::Toggle(_, set), _, ParamValue::Bool(v)) => set(config, v),
            (Accessor::Number(_, set), ParamKind::Number { min, max }, ParamValue::Number(v)) => {
                if !v.is_finite() || v < min || v > max {
                    return Err(BeanError::invalid(
                        self.key,
                        format!("{v} is outside [{min}, {max}]"),
                    ));
                }
                set(config, v);
            }
            (Accessor::Count(_, set), ParamKind::Count { min, max }, ParamValue::Number(v)) => {
                if v.fract() != 0.0 || v < min as f32 || v > max as f32 {
                    return Err(BeanError::invalid(
                        self.key,
                        format!("{v} is not a whole number in [{min}, {max}]"),
                    ));
                }
                set(config, v as u32);
            }
            (Accessor::Color(_, set), _, ParamValue::Color(v)) => set(config, v),
            (Accessor::Choice(_, set), ParamKind::Choice(options), ParamValue::Text(v)) => {
                if !set(config, &v) {
                    return Err(BeanError::invalid(
                        self.key,
                        format!("`{v}` is not one of {options:?}"),
                    ));
                }
            }
            _ => {
                return Err(BeanError::TypeMismatch {
                    key: self.key.to_string(),
                    expected: self.kind.expected(),
                })
            }
        }
        Ok(())
    }

    fn coerce(&self, value: ParamValue) -> Result<ParamValue> {
        let text = match value {
            ParamValue::Text(text) => text,
            other => return Ok(other),
        };
        let mismatch = || BeanError::TypeMismatch {
            key: self.key.to_string(),
            expected: self.kind.expected(),
        };
        match self.kind {
            ParamKind::Toggle => text.parse().map(ParamValue::Bool).map_err(|_| mismatch()),
            ParamKind::Number { .. } | ParamKind::Count { .. } => {
                text.parse().map(ParamValue::Number).map_err(|_| mismatch())
            }
            ParamKind::Color => Color::from_hex(&text).map(ParamValue::Color),
            ParamKind::Choice(_) => Ok(ParamValue::Text(text)),
        }
    }
}

const fn toggle(
    key: &'static str,
    group: ParamGroup,
    effect: ParamEffect,
    get: fn(&AppConfig) -> bool,
    set: fn(&mut AppConfig, bool),
) -> ParamDescriptor {
    ParamDescriptor {
        key,
        group,
        kind: ParamKind::Toggle,
        effect,
        access: Accessor::Toggle(get, set),
    }
}

#[allow(clippy::too_many_arguments)]
const fn number(
    key: &'static str,
    group: ParamGroup,
    effect: ParamEffect,
    min: f32,
    max: f32,
    get: fn(&AppConfig) -> f32,
    set: fn(&mut AppConfig, f32),
) -> ParamDescriptor {
    ParamDescriptor {
        key,
        group,
        kind: ParamKind::Number { min, max },
        effect,
        access: Accessor::Number(get, set),
    }
}

#[allow(clippy::too_many_arguments)]
const fn count(
    key: &'static str,
    group: ParamGroup,
    effect: ParamEffect,
    min: u32,
    max: u32,
    get: fn(&AppConfig) -> u32,
    set: fn(&mut AppConfig, u32),
) -> ParamDescriptor {
    ParamDescriptor {
        key,
        group,
        kind: ParamKind::Count { min, max },
        effect,
        access: Accessor::Count(get, set),
    }
}

const fn color(
    key: &'static str,
    get: fn(&AppConfig) -> Color,
    set: fn(&mut AppConfig, Color),
) -> ParamDescriptor {
    ParamDescriptor {
        key,
        group: ParamGroup::Style,
        kind: ParamKind::Color,
        effect: ParamEffect::UpdateStyle,
        access: Accessor::Color(get, set),
    }
}

const fn choice(
    key: &'static str,
    group: ParamGroup,
    effect: ParamEffect,
    options: &'static [&'static str],
    get: fn(&AppConfig) -> &'static str,
    set: fn(&mut AppConfig, &str) -> bool,
) -> ParamDescriptor {
    ParamDescriptor {
        key,
        group,
        kind: ParamKind::Choice(options),
        effect,
        access: Accessor::Choice(get, set),
    }
}

fn build_descriptors() -> Vec<ParamDescriptor> {
    use ParamEffect as E;
    use ParamGroup as G;

    vec![
        // Shape
        choice(
            "variant",
            G::Shape,
            E::RebuildGeometry,
            &["classic", "superellipse"],
            |c| c.shape.variant.as_str(),
            |c, v| match BeanVariant::parse(v) {
                Some(variant) => {
                    c.shape.variant = variant;
                    true
                }
                None => false,
            },
        ),
        number("beanScaleX", G::Shape, E::RebuildGeometry, 0.1, 3.0, |c| c.shape.scale_x, |c, v| c.shape.scale_x = v),
        number("beanScaleY", G::Shape, E::RebuildGeometry, 0.1, 3.0, |c| c.shape.scale_y, |c, v| c.shape.scale_y = v),
        number("beanScaleZ", G::Shape, E::RebuildGeometry, 0.1, 3.0, |c| c.shape.scale_z, |c, v| c.shape.scale_z = v),
        number("grooveDepth", G::Shape, E::RebuildGeometry, 0.0, 0.5, |c| c.shape.groove_depth, |c, v| c.shape.groove_depth = v),
        number("grooveWidth", G::Shape, E::RebuildGeometry, 0.01, 1.0, |c| c.shape.groove_width, |c, v| c.shape.groove_width = v),
        number("kidneyAmount", G::Shape, E::RebuildGeometry, -0.5, 0.5, |c| c.shape.kidney_amount, |c, v| c.shape.kidney_amount = v),
        number("kidneyOffset", G::Shape, E::RebuildGeometry, -1.0, 1.0, |c| c.shape.kidney_offset, |c, v| c.shape.kidney_offset = v),
        number("backBulge", G::Shape, E::RebuildGeometry, 0.0, 1.0, |c| c.shape.back_bulge, |c, v| c.shape.back_bulge = v),
        number("endPinch", G::Shape, E::RebuildGeometry, 0.0, 1.0, |c| c.shape.end_pinch, |c, v| c.shape.end_pinch = v),
        number("endPointiness", G::Shape, E::RebuildGeometry, 0.0, 3.0, |c| c.shape.end_pointiness, |c, v| c.shape.end_pointiness = v),
        count("segmentsU", G::Shape, E::RebuildGeometry, 3, 256, |c| c.shape.segments_u, |c, v| c.shape.segments_u = v),
        count("segmentsV", G::Shape, E::RebuildGeometry, 3, 256, |c| c.shape.segments_v, |c, v| c.shape.segments_v = v),
        // Style
        toggle("toonEnabled", G::Style, E::UpdateStyle, |c| c.style.toon_enabled, |c, v| c.style.toon_enabled = v),
        toggle("rimEnabled", G::Style, E::UpdateStyle, |c| c.style.rim_enabled, |c, v| c.style.rim_enabled = v),
        toggle("specularEnabled", G::Style, E::UpdateStyle, |c| c.style.specular_enabled, |c, v| c.style.specular_enabled = v),
        toggle("colorEnabled", G::Style, E::UpdateStyle, |c| c.style.color_enabled, |c, v| c.style.color_enabled = v),
        count("toonBands", G::Style, E::UpdateStyle, 1, 12, |c| c.style.toon_bands, |c, v| c.style.toon_bands = v),
        number("rimPower", G::Style, E::UpdateStyle, 0.1, 16.0, |c| c.style.rim_power, |c, v| c.style.rim_power = v),
        number("rimIntensity", G::Style, E::UpdateStyle, 0.0, 2.0, |c| c.style.rim_intensity, |c, v| c.style.rim_intensity = v),
        number("specularPower", G::Style, E::UpdateStyle, 1.0, 256.0, |c| c.style.specular_power, |c, v| c.style.specular_power = v),
        number("specularThreshold", G::Style, E::UpdateStyle, 0.0, 1.0, |c| c.style.specular_threshold, |c, v| c.style.specular_threshold = v),
        number("specularIntensity", G::Style, E::UpdateStyle, 0.0, 2.0, |c| c.style.specular_intensity, |c, v| c.style.specular_intensity = v),
        number("creaseWidth", G::Style, E::UpdateStyle, 0.0, 0.5, |c| c.style.crease_width, |c, v| c.style.crease_width = v),
        number("creaseLength", G::Style, E::UpdateStyle, 0.0, 1.0, |c| c.style.crease_length, |c, v| c.style.crease_length = v),
        number("creaseRadius", G::Style, E::UpdateStyle, 0.0, 0.5, |c| c.style.crease_radius, |c, v| c.style.crease_radius = v),
        number("lightDirX", G::Style, E::UpdateStyle, -1.0, 1.0, |c| c.style.light_dir.x, |c, v| c.style.light_dir.x = v),
        number("lightDirY", G::Style, E::UpdateStyle, -1.0, 1.0, |c| c.style.light_dir.y, |c, v| c.style.light_dir.y = v),
        number("lightDirZ", G::Style, E::UpdateStyle, -1.0, 1.0, |c| c.style.light_dir.z, |c, v| c.style.light_dir.z = v),
        color("baseColor", |c| c.style.base_color, |c, v| c.style.base_color = v),
        color("highlightColor", |c| c.style.highlight_color, |c, v| c.style.highlight_color = v),
        color("creaseColor", |c| c.style.crease_color, |c, v| c.style.crease_color = v),
        // Halo
        toggle("cmykEnabled", G::Halo, E::UpdateHalo, |c| c.halo.enabled, |c, v| c.halo.enabled = v),
        number("cmykOffset", G::Halo, E::UpdateHalo, 0.0, 20.0, |c| c.halo.offset, |c, v| c.halo.offset = v),
        number("cmykRotationSpeed", G::Halo, E::UpdateHalo, -5.0, 5.0, |c| c.halo.rotation_speed, |c, v| c.halo.rotation_speed = v),
        toggle("cmykBreatheEnabled", G::Halo, E::UpdateHalo, |c| c.halo.breathe_enabled, |c, v| c.halo.breathe_enabled = v),
        number("cmykBreatheIntensity", G::Halo, E::UpdateHalo, 0.0, 1.0, |c| c.halo.breathe_intensity, |c, v| c.halo.breathe_intensity = v),
        number("cmykBreatheSpeed", G::Halo, E::UpdateHalo, 0.0, 10.0, |c| c.halo.breathe_speed, |c, v| c.halo.breathe_speed = v),
        number("cmykBreatheWaveFreq", G::Halo, E::UpdateHalo, 0.0, 10.0, |c| c.halo.breathe_wave_freq, |c, v| c.halo.breathe_wave_freq = v),
        toggle(
            "cmykSubtractive",
            G::Halo,
            E::UpdateHalo,
            |c| c.halo.blend == HaloBlend::Subtractive,
            |c, v| c.halo.blend = if v { HaloBlend::Subtractive } else { HaloBlend::Additive },
        ),
        // Field
        count("beanCount", G::Field, E::Respawn, 1, 500, |c| c.field.bean_count, |c, v| c.field.bean_count = v),
        number("spreadX", G::Field, E::Respawn, 0.0, 40.0, |c| c.field.spread_x, |c, v| c.field.spread_x = v),
        number("spreadY", G::Field, E::Respawn, 0.0, 40.0, |c| c.field.spread_y, |c, v| c.field.spread_y = v),
        number("depthMin", G::Field, E::Respawn, -30.0, 10.0, |c| c.field.depth_min, |c, v| c.field.depth_min = v),
        number("depthMax", G::Field, E::Respawn, -30.0, 10.0, |c| c.field.depth_max, |c, v| c.field.depth_max = v),
        number("scaleMin", G::Field, E::Respawn, 0.01, 3.0, |c| c.field.scale_min, |c, v| c.field.scale_min = v),
        number("scaleMax", G::Field, E::Respawn, 0.01, 3.0, |c| c.field.scale_max, |c, v| c.field.scale_max = v),
        choice(
            "colorMode",
            G::Field,
            E::Respawn,
            &["single", "blend"],
            |c| match c.field.color_mode {
                ColorMode::Single => "single",
                ColorMode::Blend => "blend",
            },
            |c, v| {
                c.field.color_mode = match v {
                    "single" => ColorMode::Single,
                    "blend" => ColorMode::Blend,
                    _ => return false,
                };
                true
            },
        ),
        toggle("animateEntrance", G::Field, E::Respawn, |c| c.field.animate_entrance, |c, v| c.field.animate_entrance = v),
        number("driftSpeed", G::Field, E::RecomputeVelocity, 0.0, 0.2, |c| c.field.drift_speed, |c, v| c.field.drift_speed = v),
        number("rotationSpeed", G::Field, E::RecomputeVelocity, 0.0, 0.2, |c| c.field.rotation_speed, |c, v| c.field.rotation_speed = v),
        number("staggerDelay", G::Field, E::NextSpawn, 0.0, 0.5, |c| c.field.stagger_delay, |c, v| c.field.stagger_delay = v),
        number("animationDuration", G::Field, E::NextSpawn, 0.0, 5.0, |c| c.field.animation_duration, |c, v| c.field.animation_duration = v),
        number("elasticAmplitude", G::Field, E::NextSpawn, 1.0, 3.0, |c| c.field.elastic_amplitude, |c, v| c.field.elastic_amplitude = v),
        number("elasticPeriod", G::Field, E::NextSpawn, 0.05, 2.0, |c| c.field.elastic_period, |c, v| c.field.elastic_period = v),
        // Mode
        toggle("singleBeanMode", G::Mode, E::ToggleMode, |c| c.mode.single_bean_mode, |c, v| c.mode.single_bean_mode = v),
        number("transitionDuration", G::Mode, E::None, 0.1, 5.0, |c| c.mode.transition_duration, |c, v| c.mode.transition_duration = v),
        number("dragSensitivity", G::Mode, E::None, 0.0, 0.1, |c| c.mode.drag_sensitivity, |c, v| c.mode.drag_sensitivity = v),
    ]
}

/// Every registered parameter, in panel order.
pub fn descriptors() -> &'static [ParamDescriptor] {
    static DESCRIPTORS: OnceLock<Vec<ParamDescriptor>> = OnceLock::new();
    DESCRIPTORS.get_or_init(build_descriptors)
}

pub fn find(key: &str) -> Option<&'static ParamDescriptor> {
    descriptors().iter().find(|d| d.key == key)
}

/// Writes `value` to `key`. The config is only modified when the new value
/// passes both the descriptor's own check and whole-config validation.
pub fn apply(config: &mut AppConfig, key: &str, value: ParamValue) -> Result<ParamEffect> {
    let descriptor = find(key).ok_or_else(|| BeanError::UnknownParameter(key.to_string()))?;
    let mut candidate = config.clone();
    descriptor.set(&mut candidate, value)?;
    candidate.validate()?;
    *config = candidate;
    Ok(descriptor.effect)
}

/// Parses a `key=value` assignment as typed on a command line.
pub fn parse_assignment(text: &str) -> Result<(String, ParamValue)> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| BeanError::msg(format!("expected key=value, got `{text}`")))?;
    Ok((key.trim().to_string(), ParamValue::Text(value.trim().to_string())))
}
