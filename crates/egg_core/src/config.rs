//! Per-export configuration.
//!
//! One immutable [`ExportConfig`] is constructed per export call and
//! passed by reference through every component. There is no process-wide
//! option state, so concurrent exports from different threads cannot
//! observe each other's settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One named animation to sample and serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationRange {
    /// Name of the animation as accessed by the engine.
    pub name: String,

    /// First sampled frame, inclusive.
    pub from_frame: i32,

    /// Stop frame, exclusive. Equal to `from_frame` still yields one
    /// sampled frame.
    pub to_frame: i32,

    /// Sample rate written into the animation tables. `None` uses the
    /// scene's playback rate.
    #[serde(default)]
    pub fps: Option<f32>,
}

/// Options for a single export call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Path of the main output document.
    pub path: PathBuf,

    /// Animations to sample, in emission order.
    pub animations: Vec<AnimationRange>,

    /// Write each animation into its own `<base>-<name>.egg` file
    /// instead of appending to the main document.
    pub separate_anim_files: bool,

    /// Skip the material, texture, and hierarchy blocks; emit animation
    /// tables only.
    pub anim_only: bool,

    /// Emit per-corner `<Tangent>`/`<Binormal>` pairs for UV layers that
    /// carry tangent data.
    pub calc_tangents: bool,

    /// Append the synthetic ORCO coordinate layer computed from the
    /// object-local bounding box.
    pub export_orco: bool,

    /// Emit vertex colors whenever a color layer exists, regardless of
    /// the face's material.
    pub force_export_vertex_colors: bool,

    /// Prefer host-supplied custom per-corner normals over vertex
    /// normals for smooth corners.
    pub use_loop_normals: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            animations: Vec::new(),
            separate_anim_files: false,
            anim_only: false,
            calc_tangents: false,
            export_orco: false,
            force_export_vertex_colors: false,
            use_loop_normals: false,
        }
    }
}

impl ExportConfig {
    /// Config writing a single file to `path` with default options.
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_round_trip() {
        let config = ExportConfig {
            path: PathBuf::from("scene.egg"),
            animations: vec![AnimationRange {
                name: "walk".to_string(),
                from_frame: 1,
                to_frame: 25,
                fps: Some(24.0),
            }],
            separate_anim_files: true,
            ..Default::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let back: ExportConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.path, config.path);
        assert_eq!(back.animations.len(), 1);
        assert_eq!(back.animations[0].name, "walk");
        assert_eq!(back.animations[0].fps, Some(24.0));
        assert!(back.separate_anim_files);
        assert!(!back.anim_only);
    }
}
