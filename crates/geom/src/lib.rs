//! Vantage collision geometry.
//!
//! Shapes, the Spatial Mesh Index and the physics query seam used by the
//! character simulation. Everything here is read-only once built, so one
//! [`CollisionWorld`] can serve any number of characters.
//!
//! # Modules
//!
//! - [`mesh_index`]: octree / BSP partition over a triangle mesh.
//! - [`shape`]: sphere, box, capsule and mesh surface queries.
//! - [`world`]: the [`PhysicsQuery`] trait and the reference [`CollisionWorld`].

#![deny(unsafe_code)]

pub mod aabb;
pub mod math;
pub mod mesh_index;
pub mod shape;
pub mod triangle;
pub mod world;

pub use aabb::Aabb;
pub use mesh_index::{IndexKind, MeshError, MeshIndex, MeshIndexConfig, SpatialNode, TriangleId};
pub use shape::{Pose, Shape, ShapeHit};
pub use world::{
    Collider, ColliderId, CollisionWorld, Layers, PhysicsQuery, QueryFilter, RayHit, SurfaceType,
};
