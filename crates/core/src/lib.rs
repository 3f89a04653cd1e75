//! Core library for the bean field renderer.
//!
//! A field of stylised coffee beans drifts across the screen, cel-shaded and
//! outlined by a rotating cyan/magenta/yellow halo. One bean can be pulled out
//! of the crowd into a focused view and spun by dragging. Each module owns one
//! subsystem: mesh generation, shading, the halo pass, the particle field,
//! keyframe tracks, the focus transition, and the scene that ties them
//! together for a host frame loop.

pub mod config;
pub mod error;
pub mod field;
pub mod geometry;
pub mod halo;
pub mod params;
pub mod render;
pub mod scene;
pub mod shading;
pub mod timeline;
pub mod transition;

pub use config::AppConfig;
pub use error::{BeanError, Result};
pub use field::{BeanInstance, FieldConfig, ParticleField, SpawnMode};
pub use geometry::{generate, BeanVariant, Mesh, MeshHandle, ShapeConfig};
pub use halo::{EdgeHalo, FrameBuffer, HaloConfig};
pub use params::{ParamDescriptor, ParamEffect, ParamValue};
pub use render::RenderGraph;
pub use scene::{Camera, RenderContext, Viewport};
pub use shading::{Color, StyleConfig};
pub use timeline::{Easing, PlaybackClock, Timeline};
pub use transition::{ModeRequest, ModeState, TransitionController};
