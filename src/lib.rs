//! wheel-shell - rigid wheel / terrain contact geometry for real-time
//! vehicle simulation.
//!
//! A wheel is approximated as a row of parallel narrow contact disks
//! ("ribs") swept along its cross-sectional profile. Each step the [`Shell`]
//! adopts the wheel's world pose, prunes candidate terrain triangles through
//! the [`SpatialTree`], runs one of two per-rib enveloping algorithms
//! (exact circular-segment integration or 4-ray sampling) and aggregates
//! contact point, normal, friction, penetration depth, patch area and
//! interpenetration volume across the ribs.
//!
//! Terrain is either a finalized [`TerrainMesh`] (immutable triangle store
//! plus its bounding-volume tree) or an infinite [`FlatTerrain`] plane.
//! The world convention is Z-up; all math is `f32` (`parry3d::math::Real`).
//!
//! Everything is synchronous and single-threaded per step: one `setup` call
//! per simulation step, no internal locking, no state shared across steps
//! beyond the immutable terrain.

pub mod aabb;
pub mod enveloping;
pub mod shell;
pub mod spatial_tree;
pub mod terrain;

pub use aabb::TaggedAabb;
pub use enveloping::{ContactOutput, EnvelopingMethod, Pose, Rib, RibFrame};
pub use shell::{ContactReport, Shell, ShellShape, Terrain};
pub use spatial_tree::SpatialTree;
pub use terrain::{FlatTerrain, MeshLoadError, TerrainMesh, TerrainTriangle};
