//! Egg (Panda3D scene text format) serialization.
//!
//! This module turns the host-facing scene representation into egg
//! files: nested `<Tag> name { ... }` blocks holding the group tree,
//! vertex pools, polygons, joints, and sampled animation tables.
//!
//! ## Pipeline
//!
//! - `hierarchy`: flat working set to scene tree, bones expanded inline
//! - `topology`: shared-vertex meshes to per-corner vertex streams
//! - `skinning`: per-joint vertex membership tables
//! - `anim`: frame-sequential pose and shape-key sampling
//! - `material`: `<Material>` / `<Texture>` header blocks
//! - `writer`: file assembly and emission
//!
//! # Example
//!
//! ```ignore
//! use egg_core::egg::write_out;
//! use egg_core::ExportConfig;
//!
//! let tags = write_out(&mut scene, &ExportConfig {
//!     path: "scene.egg".into(),
//!     ..Default::default()
//! });
//! assert!(tags.is_empty());
//! ```

pub mod anim;
pub mod format;
pub mod hierarchy;
pub mod material;
pub mod skinning;
pub mod topology;
pub mod writer;

pub use anim::{AnimationClip, JointAnim, ObjectAnim};
pub use hierarchy::{Hierarchy, HierarchyError, NodeData, SceneNode};
pub use skinning::SkinTable;
pub use topology::{GeometryError, MeshGeometry};
pub use writer::{write_out, ErrorTag, ExportError, ExportResult};
