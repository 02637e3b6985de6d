//! Egg Core - scene graph export to the Panda3D egg text format.
//!
//! This crate provides:
//!
//! - **Scene types**: `SceneObject`, `MeshData`, `ArmatureData`, plus
//!   the `SceneSource` trait a host implements to feed the exporter
//! - **Egg serialization**: hierarchy assembly, per-corner topology,
//!   skinning tables, animation sampling, and file emission
//!
//! # Example
//!
//! ```ignore
//! use egg_core::scene::MemoryScene;
//! use egg_core::{write_out, ExportConfig};
//!
//! let mut scene = MemoryScene::new(objects);
//! let tags = write_out(&mut scene, &ExportConfig {
//!     path: "scene.egg".into(),
//!     ..Default::default()
//! });
//! for tag in &tags {
//!     eprintln!("export error: {}", tag.as_str());
//! }
//! ```

pub mod config;
pub mod egg;
pub mod scene;

// Re-export commonly used types
pub use config::{AnimationRange, ExportConfig};
pub use egg::{write_out, ErrorTag, ExportError, ExportResult};
pub use scene::{MemoryScene, ObjectData, SceneObject, SceneSource};
