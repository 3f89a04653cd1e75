use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    field::FieldConfig, geometry::ShapeConfig, halo::HaloConfig, scene::CameraConfig,
    shading::StyleConfig, transition::ModeConfig, BeanError, Result,
};

/// Top-level configuration structure for the application.
///
/// Every group falls back to its defaults, so a preset file only needs the
/// keys it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub shape: ShapeConfig,
    pub style: StyleConfig,
    pub halo: HaloConfig,
    pub field: FieldConfig,
    pub mode: ModeConfig,
    pub camera: CameraConfig,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading config");
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Cross-field checks that individual descriptors cannot express.
    pub fn validate(&self) -> Result<()> {
        self.shape.validate()?;
        self.field.validate()?;
        if self.style.toon_bands == 0 {
            return Err(BeanError::invalid("toonBands", "must be at least 1"));
        }
        if !self.style.light_dir.is_finite() || self.style.light_dir.length_squared() == 0.0 {
            return Err(BeanError::invalid("lightDir", "must be a finite non-zero vector"));
        }
        if !self.halo.offset.is_finite() || self.halo.offset < 0.0 {
            return Err(BeanError::invalid("cmykOffset", "must be finite and non-negative"));
        }
        if self.mode.transition_duration <= 0.0 {
            return Err(BeanError::invalid("transitionDuration", "must be positive"));
        }
        if self.camera.distance <= 0.0 || !(1.0..179.0).contains(&self.camera.fov_degrees) {
            return Err(BeanError::invalid("camera", "distance and field of view out of range"));
        }
        Ok(())
    }
}
