//! Spatial Mesh Index.
//!
//! A read-only partition of a triangle mesh that accelerates nearest-point,
//! radius and ray queries. Two strategies are available:
//!
//! - [`IndexKind::Octree`]: a cube around the mesh bounds, split into eight
//!   octants until cells reach `min_cell_half_extent`.
//! - [`IndexKind::Bsp`]: split at the center of the longest axis until a
//!   child stops shrinking or holds few enough triangles.
//!
//! In both cases a triangle whose bounds straddle a split is stored in every
//! child it overlaps, so a query near a boundary never misses it.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::aabb::Aabb;
use crate::triangle::{closest_point_on_triangle, ray_triangle, triangle_normal};

/// Index into the triangle list of a [`MeshIndex`].
pub type TriangleId = u32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("index count {0} is not a multiple of 3")]
    RaggedIndices(usize),

    #[error("vertex index {index} out of range ({vertex_count} vertices)")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Octree,
    Bsp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshIndexConfig {
    pub kind: IndexKind,
    /// A node holding this many triangles or fewer becomes a leaf.
    pub max_leaf_triangles: usize,
    /// Octree cells stop splitting once half their size would drop to this.
    pub min_cell_half_extent: f32,
    pub max_depth: u32,
}

impl Default for MeshIndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::Octree,
            max_leaf_triangles: 3,
            min_cell_half_extent: 0.5,
            max_depth: 16,
        }
    }
}

/// Index-mesh record with cached bounds and face normal.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub indices: [u32; 3],
    pub bounds: Aabb,
    pub normal: Vec3,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Leaf(Vec<TriangleId>),
    Octants(Box<[SpatialNode; 8]>),
    Split {
        axis: usize,
        plane: f32,
        children: Box<[SpatialNode; 2]>,
    },
}

#[derive(Debug, Clone)]
pub struct SpatialNode {
    pub bounds: Aabb,
    pub kind: NodeKind,
}

impl SpatialNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Triangles stored directly in this node (empty for interior nodes).
    pub fn triangles(&self) -> &[TriangleId] {
        match &self.kind {
            NodeKind::Leaf(tris) => tris,
            _ => &[],
        }
    }

    fn children(&self) -> &[SpatialNode] {
        match &self.kind {
            NodeKind::Leaf(_) => &[],
            NodeKind::Octants(children) => &children[..],
            NodeKind::Split { children, .. } => &children[..],
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeshIndex {
    vertices: Vec<Vec3>,
    triangles: Vec<Triangle>,
    root: SpatialNode,
    kind: IndexKind,
}

impl MeshIndex {
    /// Build the index. `indices` lists three vertex indices per triangle.
    pub fn build(
        vertices: Vec<Vec3>,
        indices: &[u32],
        config: &MeshIndexConfig,
    ) -> Result<Self, MeshError> {
        if indices.len() % 3 != 0 {
            return Err(MeshError::RaggedIndices(indices.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count: vertices.len(),
            });
        }

        let triangles: Vec<Triangle> = indices
            .chunks_exact(3)
            .map(|chunk| {
                let [a, b, c] = [chunk[0], chunk[1], chunk[2]].map(|i| vertices[i as usize]);
                Triangle {
                    indices: [chunk[0], chunk[1], chunk[2]],
                    bounds: Aabb::from_points(&[a, b, c]),
                    normal: triangle_normal(a, b, c),
                }
            })
            .collect();

        let all: Vec<TriangleId> = (0..triangles.len() as TriangleId).collect();
        let mesh_bounds = triangles
            .iter()
            .map(|t| t.bounds)
            .reduce(|acc, b| acc.union(&b))
            .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));

        let builder = Builder {
            triangles: &triangles,
            config,
        };
        let root = match config.kind {
            IndexKind::Octree => {
                let half = mesh_bounds.half_extents.max_element();
                let cube = Aabb::new(mesh_bounds.center, Vec3::splat(half));
                builder.octree(cube, all, 0)
            }
            IndexKind::Bsp => builder.bsp(mesh_bounds, all, 0),
        };

        let index = Self {
            vertices,
            triangles,
            root,
            kind: config.kind,
        };
        debug!(
            kind = ?index.kind,
            triangles = index.triangles.len(),
            leaves = index.leaf_count(),
            "built mesh index"
        );
        Ok(index)
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn root(&self) -> &SpatialNode {
        &self.root
    }

    pub fn bounds(&self) -> Aabb {
        self.root.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, id: TriangleId) -> &Triangle {
        &self.triangles[id as usize]
    }

    pub fn triangle_vertices(&self, id: TriangleId) -> [Vec3; 3] {
        self.triangles[id as usize]
            .indices
            .map(|i| self.vertices[i as usize])
    }

    /// Cached unit face normal of triangle `id`.
    pub fn triangle_normal(&self, id: TriangleId) -> Vec3 {
        self.triangles[id as usize].normal
    }

    fn leaf_count(&self) -> usize {
        fn count(node: &SpatialNode) -> usize {
            if node.is_leaf() {
                1
            } else {
                node.children().iter().map(count).sum()
            }
        }
        count(&self.root)
    }

    /// Non-empty leaves whose bounds touch the sphere.
    pub fn nodes_near(&self, point: Vec3, radius: f32) -> Vec<&SpatialNode> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if !node.bounds.intersects_sphere(point, radius) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(tris) if !tris.is_empty() => out.push(node),
                NodeKind::Leaf(_) => {}
                _ => stack.extend(node.children()),
            }
        }
        out
    }

    /// Triangles whose bounds intersect the sphere, sorted and deduplicated.
    pub fn query_triangles_near(&self, point: Vec3, radius: f32) -> Vec<TriangleId> {
        let mut ids: Vec<TriangleId> = self
            .nodes_near(point, radius)
            .into_iter()
            .flat_map(|node| node.triangles().iter().copied())
            .filter(|&id| {
                self.triangles[id as usize]
                    .bounds
                    .intersects_sphere(point, radius)
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Nearest surface point among the triangles within `radius`, along with
    /// the triangle it lies on.
    pub fn closest(&self, point: Vec3, radius: f32) -> Option<(Vec3, TriangleId)> {
        let mut best: Option<(Vec3, TriangleId, f32)> = None;
        for id in self.query_triangles_near(point, radius) {
            let [a, b, c] = self.triangle_vertices(id);
            let candidate = closest_point_on_triangle(a, b, c, point);
            let dist_sq = (candidate - point).length_squared();
            if best.is_none_or(|(_, _, d)| dist_sq < d) {
                best = Some((candidate, id, dist_sq));
            }
        }
        best.map(|(p, id, _)| (p, id))
    }

    /// Nearest surface point within `radius`; `None` when nothing is in range.
    pub fn closest_point(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        self.closest(point, radius).map(|(p, _)| p)
    }

    /// First front-facing triangle hit by the ray within `max_distance`.
    pub fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<(f32, TriangleId)> {
        let mut best: Option<(f32, TriangleId)> = None;
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            let limit = best.map_or(max_distance, |(t, _)| t);
            if node.bounds.ray_entry(origin, dir, limit).is_none() {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(tris) => {
                    for &id in tris {
                        let limit = best.map_or(max_distance, |(t, _)| t);
                        let [a, b, c] = self.triangle_vertices(id);
                        if let Some(t) = ray_triangle(origin, dir, a, b, c, limit) {
                            if best.is_none_or(|(bt, bid)| t < bt || (t == bt && id < bid)) {
                                best = Some((t, id));
                            }
                        }
                    }
                }
                _ => stack.extend(node.children()),
            }
        }
        best
    }
}

struct Builder<'a> {
    triangles: &'a [Triangle],
    config: &'a MeshIndexConfig,
}

impl Builder<'_> {
    fn overlapping(&self, bounds: &Aabb, tris: &[TriangleId]) -> Vec<TriangleId> {
        tris.iter()
            .copied()
            .filter(|&id| self.triangles[id as usize].bounds.intersects(bounds))
            .collect()
    }

    fn octree(&self, bounds: Aabb, tris: Vec<TriangleId>, depth: u32) -> SpatialNode {
        let child_half = bounds.half_extents * 0.5;
        let stop = tris.len() <= self.config.max_leaf_triangles
            || child_half.max_element() <= self.config.min_cell_half_extent
            || depth >= self.config.max_depth;
        if stop {
            return SpatialNode {
                bounds,
                kind: NodeKind::Leaf(tris),
            };
        }

        let children = std::array::from_fn(|i| {
            let sign = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            let octant = Aabb::new(bounds.center + sign * child_half, child_half);
            let inside = self.overlapping(&octant, &tris);
            self.octree(octant, inside, depth + 1)
        });

        SpatialNode {
            bounds,
            kind: NodeKind::Octants(Box::new(children)),
        }
    }

    fn bsp(&self, bounds: Aabb, tris: Vec<TriangleId>, depth: u32) -> SpatialNode {
        if tris.len() <= self.config.max_leaf_triangles || depth >= self.config.max_depth {
            return SpatialNode {
                bounds,
                kind: NodeKind::Leaf(tris),
            };
        }

        let axis = bounds.longest_axis();
        let plane = bounds.center[axis];
        let (min, max) = (bounds.min(), bounds.max());

        let mut left_max = max;
        left_max[axis] = plane;
        let mut right_min = min;
        right_min[axis] = plane;
        let regions = [
            Aabb::from_min_max(min, left_max),
            Aabb::from_min_max(right_min, max),
        ];

        let left: Vec<TriangleId> = tris
            .iter()
            .copied()
            .filter(|&id| self.triangles[id as usize].bounds.min()[axis] <= plane)
            .collect();
        let right: Vec<TriangleId> = tris
            .iter()
            .copied()
            .filter(|&id| self.triangles[id as usize].bounds.max()[axis] >= plane)
            .collect();

        // A split that fails to shrink either side makes no progress
        if left.len() == tris.len() && right.len() == tris.len() {
            return SpatialNode {
                bounds,
                kind: NodeKind::Leaf(tris),
            };
        }

        let parent_len = tris.len();
        let [left_bounds, right_bounds] = regions;
        let child = |region: Aabb, subset: Vec<TriangleId>| {
            if subset.len() < parent_len && subset.len() > self.config.max_leaf_triangles {
                self.bsp(region, subset, depth + 1)
            } else {
                SpatialNode {
                    bounds: region,
                    kind: NodeKind::Leaf(subset),
                }
            }
        };
        let children = [child(left_bounds, left), child(right_bounds, right)];

        SpatialNode {
            bounds,
            kind: NodeKind::Split {
                axis,
                plane,
                children: Box::new(children),
            },
        }
    }
}
