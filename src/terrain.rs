// ==============================================================================
// terrain.rs - TERRAIN TRIANGLE STORE + FLAT GROUND
// ------------------------------------------------------------------------------
// The finalized, immutable triangle array plus the spatial tree built over
// it. Triangles carry a unit normal with a non-negative vertical component,
// a friction scalar and a cached bounding box; every other component refers
// to them by plain index.
//
// Built once per terrain load (or explicit rebuild) and read-only afterwards;
// concurrent queries against a finished build are safe.
//
// The loader understands the minimal node/element text format
// (`v x y z` / `f i j k`, 1-based indices, `#` comments).
// ==============================================================================

use parry3d::math::{Point, Real, Vector};
use parry3d::shape::Triangle;
use thiserror::Error;

use crate::aabb::TaggedAabb;
use crate::spatial_tree::SpatialTree;

#[derive(Clone, Debug)]
pub struct TerrainTriangle {
    pub shape: Triangle,
    /// Unit normal, flipped so that `normal.z >= 0`.
    pub normal: Vector<Real>,
    /// Friction scalar, >= 0.
    pub friction: Real,
    /// Cached bounding box (untagged; the store tags tree boxes itself).
    pub bbox: TaggedAabb,
}

impl TerrainTriangle {
    /// Finalize one triangle. Degenerate (zero-area) triangles have no
    /// normal and yield None.
    pub fn from_vertices(
        a: Point<Real>,
        b: Point<Real>,
        c: Point<Real>,
        friction: Real,
    ) -> Option<Self> {
        let shape = Triangle::new(a, b, c);
        let normal = shape.normal()?;
        let mut normal = normal.into_inner();
        if normal.z < 0.0 {
            normal = -normal;
        }
        let mut bbox = TaggedAabb::from_triangle(&shape, 0);
        bbox.id = None;
        Some(Self {
            shape,
            normal,
            friction,
            bbox,
        })
    }
}

/// Infinite flat ground: the plane `z = height` with uniform friction.
#[derive(Clone, Copy, Debug)]
pub struct FlatTerrain {
    pub height: Real,
    pub friction: Real,
}

impl FlatTerrain {
    pub fn new(height: Real, friction: Real) -> Self {
        assert!(friction >= 0.0, "friction must be non-negative");
        Self { height, friction }
    }

    pub fn at_origin(friction: Real) -> Self {
        Self::new(0.0, friction)
    }
}

#[derive(Debug, Error)]
pub enum MeshLoadError {
    #[error("line {line}: malformed vertex record")]
    BadVertex { line: usize },
    #[error("line {line}: malformed face record")]
    BadFace { line: usize },
    #[error("line {line}: vertex index {index} out of range (mesh has {count} vertices)")]
    IndexOutOfRange {
        line: usize,
        index: usize,
        count: usize,
    },
    #[error("mesh contains no triangles")]
    Empty,
}

/// Immutable terrain triangle store with its spatial tree.
pub struct TerrainMesh {
    triangles: Vec<TerrainTriangle>,
    tree: SpatialTree,
}

impl TerrainMesh {
    /// Finalize a triangle array with uniform friction and bulk-build the
    /// spatial tree over it. Face indices must be in range.
    pub fn new(vertices: &[Point<Real>], faces: &[[usize; 3]], friction: Real) -> Self {
        Self::with_friction_fn(vertices, faces, |_| friction)
    }

    /// Per-triangle friction variant; `friction(i)` is called with the face
    /// index.
    pub fn with_friction_fn(
        vertices: &[Point<Real>],
        faces: &[[usize; 3]],
        friction: impl Fn(usize) -> Real,
    ) -> Self {
        let mut triangles = Vec::with_capacity(faces.len());
        let mut boxes = Vec::with_capacity(faces.len());
        let mut degenerate = 0usize;
        for (fi, face) in faces.iter().enumerate() {
            let [a, b, c] = *face;
            match TerrainTriangle::from_vertices(vertices[a], vertices[b], vertices[c], friction(fi))
            {
                Some(tri) => {
                    let mut bbox = tri.bbox;
                    bbox.id = Some(triangles.len());
                    boxes.push(bbox);
                    triangles.push(tri);
                }
                None => degenerate += 1,
            }
        }
        if degenerate > 0 {
            tracing::warn!(degenerate, "skipped zero-area terrain triangles");
        }
        let tree = SpatialTree::build(boxes);
        tracing::info!(
            triangles = triangles.len(),
            nodes = tree.node_count(),
            "terrain mesh finalized"
        );
        Self { triangles, tree }
    }

    /// Parse the minimal `v x y z` / `f i j k` text format (1-based face
    /// indices, `#` comments, unknown records ignored).
    pub fn from_text(text: &str, friction: Real) -> Result<Self, MeshLoadError> {
        let mut vertices: Vec<Point<Real>> = Vec::new();
        let mut faces: Vec<[usize; 3]> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut tokens = trimmed.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let mut coords = [0.0 as Real; 3];
                    for c in coords.iter_mut() {
                        *c = tokens
                            .next()
                            .and_then(|t| t.parse::<Real>().ok())
                            .ok_or(MeshLoadError::BadVertex { line })?;
                    }
                    vertices.push(Point::new(coords[0], coords[1], coords[2]));
                }
                Some("f") => {
                    let mut idxs = [0usize; 3];
                    for i in idxs.iter_mut() {
                        let index = tokens
                            .next()
                            .and_then(|t| t.parse::<usize>().ok())
                            .ok_or(MeshLoadError::BadFace { line })?;
                        if index == 0 || index > vertices.len() {
                            return Err(MeshLoadError::IndexOutOfRange {
                                line,
                                index,
                                count: vertices.len(),
                            });
                        }
                        *i = index - 1;
                    }
                    faces.push(idxs);
                }
                _ => {
                    tracing::trace!(line, "ignored unknown mesh record");
                }
            }
        }

        if faces.is_empty() {
            return Err(MeshLoadError::Empty);
        }
        Ok(Self::new(&vertices, &faces, friction))
    }

    pub fn triangles(&self) -> &[TerrainTriangle] {
        &self.triangles
    }

    pub fn tree(&self) -> &SpatialTree {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}
