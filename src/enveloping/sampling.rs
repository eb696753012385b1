// ==============================================================================
// sampling.rs - RAY-SAMPLING ENVELOPING
// ------------------------------------------------------------------------------
// Four downward casts through the contact patch, offset from the rib center
// by ±0.1·radius laterally and ±0.3·width longitudinally. The contact point
// is the mean of the four hits; the normal is the cross product of the
// quadrilateral's diagonals (no blending with terrain normals). Any missed
// cast, or a non-positive depth, collapses to the no-contact fallback.
// ==============================================================================

use parry3d::math::{Point, Real, Vector};

use crate::enveloping::kernel;
use crate::enveloping::no_contact;
use crate::enveloping::types::{ContactOutput, NORMAL_EPS, PARALLEL_EPS, Rib, RibFrame};
use crate::terrain::{FlatTerrain, TerrainTriangle};

/// Lateral cast offset as a fraction of the rib radius.
const LATERAL_OFFSET: Real = 0.1;
/// Longitudinal cast offset as a fraction of the rib width.
const LONGITUDINAL_OFFSET: Real = 0.3;

/// Cast origins in ring order, so that (2,0) and (3,1) are the diagonals.
const RING: [(Real, Real); 4] = [(1.0, 1.0), (1.0, -1.0), (-1.0, -1.0), (-1.0, 1.0)];

#[inline]
fn cast_origin(rib: &Rib, frame: &RibFrame, corner: (Real, Real)) -> Point<Real> {
    let lat = LATERAL_OFFSET * rib.radius;
    let lon = LONGITUDINAL_OFFSET * rib.width;
    frame.center + frame.axis * (corner.0 * lat) + frame.longitudinal * (corner.1 * lon)
}

/// Sampling enveloping of one rib against a candidate set of mesh triangles.
pub fn envelope_mesh(
    rib: &Rib,
    frame: &RibFrame,
    triangles: &[TerrainTriangle],
    candidates: &[usize],
) -> (ContactOutput, bool) {
    let down = -Vector::z();
    let mut hits = [Point::origin(); 4];
    let mut frictions = [0.0; 4];

    for (k, corner) in RING.iter().enumerate() {
        let origin = cast_origin(rib, frame, *corner);
        let mut best: Option<(Point<Real>, Real)> = None;
        for &ti in candidates {
            let tri = &triangles[ti];
            if let Some(p) =
                kernel::line_triangle_intersection(&origin, &down, &tri.shape, PARALLEL_EPS)
            {
                // keep the highest hit; the first found wins exact ties
                if best.map_or(true, |(bp, _)| p.z > bp.z) {
                    best = Some((p, tri.friction));
                }
            }
        }
        let Some((p, mu)) = best else {
            return no_contact(rib, frame);
        };
        hits[k] = p;
        frictions[k] = mu;
    }

    finish(rib, frame, &hits, &frictions)
}

/// Sampling enveloping of one rib against the infinite flat ground.
pub fn envelope_flat(rib: &Rib, frame: &RibFrame, flat: &FlatTerrain) -> (ContactOutput, bool) {
    let mut hits = [Point::origin(); 4];
    let frictions = [flat.friction; 4];

    for (k, corner) in RING.iter().enumerate() {
        let origin = cast_origin(rib, frame, *corner);
        hits[k] = Point::new(origin.x, origin.y, flat.height);
    }

    finish(rib, frame, &hits, &frictions)
}

fn finish(
    rib: &Rib,
    frame: &RibFrame,
    hits: &[Point<Real>; 4],
    frictions: &[Real; 4],
) -> (ContactOutput, bool) {
    let mean = Point::from(
        (hits[0].coords + hits[1].coords + hits[2].coords + hits[3].coords) * 0.25,
    );

    let diag_a = hits[2] - hits[0];
    let diag_b = hits[3] - hits[1];
    let mut normal = diag_a.cross(&diag_b);
    let len = normal.norm();
    if len < NORMAL_EPS {
        return no_contact(rib, frame);
    }
    normal /= len;
    if normal.z < 0.0 {
        normal = -normal;
    }

    let depth = rib.radius * normal.dot(&frame.up).abs() - (mean - frame.center).norm();
    if depth <= 0.0 {
        return no_contact(rib, frame);
    }

    let friction = (frictions[0] + frictions[1] + frictions[2] + frictions[3]) * 0.25;
    (
        ContactOutput {
            point: mean,
            normal,
            friction,
            depth,
            area: kernel::patch_area(rib.radius, depth, rib.width),
            volume: kernel::patch_volume(rib.radius, depth, rib.width),
        },
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enveloping::types::Pose;
    use crate::terrain::TerrainTriangle;

    fn test_rib() -> Rib {
        Rib {
            radius: 0.15,
            center: Point::origin(),
            normal: Vector::y(),
            width: 0.1,
            inclination: 0.0,
        }
    }

    fn frame_at(rib: &Rib, z: Real) -> RibFrame {
        let mut pose = Pose::identity();
        pose.translation = Vector::new(0.0, 0.0, z);
        RibFrame::new(rib, &pose)
    }

    #[test]
    fn flat_ground_depth_point_and_normal() {
        let rib = test_rib();
        let frame = frame_at(&rib, 0.1);
        let flat = FlatTerrain::new(0.0, 0.8);
        let (out, hit) = envelope_flat(&rib, &frame, &flat);
        assert!(hit);
        assert!((out.depth - 0.05).abs() < 1.0e-4);
        assert!((out.point - Point::new(0.0, 0.0, 0.0)).norm() < 1.0e-5);
        assert!((out.normal - Vector::z()).norm() < 1.0e-5);
        assert_eq!(out.friction, 0.8);
    }

    #[test]
    fn missed_cast_falls_back_to_no_contact() {
        let rib = test_rib();
        let frame = frame_at(&rib, 0.1);
        // a sliver far away from the cast footprint
        let tris: Vec<TerrainTriangle> = TerrainTriangle::from_vertices(
            Point::new(10.0, 10.0, 0.0),
            Point::new(11.0, 10.0, 0.0),
            Point::new(10.0, 11.0, 0.0),
            1.0,
        )
        .into_iter()
        .collect();
        let (out, hit) = envelope_mesh(&rib, &frame, &tris, &[0]);
        assert!(!hit);
        assert_eq!(out.depth, 0.0);
        assert_eq!(out.volume, 0.0);
    }

    #[test]
    fn empty_candidate_set_is_no_contact() {
        let rib = test_rib();
        let frame = frame_at(&rib, 0.1);
        let (out, hit) = envelope_mesh(&rib, &frame, &[], &[]);
        assert!(!hit);
        assert_eq!(out.friction, 0.0);
        assert_eq!(out.area, 0.0);
    }

    #[test]
    fn highest_hit_wins_between_stacked_patches() {
        let rib = test_rib();
        let frame = frame_at(&rib, 0.12);
        // two large patches, one at z = 0 and one at z = 0.04
        let mut tris = Vec::new();
        tris.extend(TerrainTriangle::from_vertices(
            Point::new(-5.0, -5.0, 0.0),
            Point::new(5.0, -5.0, 0.0),
            Point::new(0.0, 5.0, 0.0),
            0.4,
        ));
        tris.extend(TerrainTriangle::from_vertices(
            Point::new(-5.0, -5.0, 0.04),
            Point::new(5.0, -5.0, 0.04),
            Point::new(0.0, 5.0, 0.04),
            1.0,
        ));
        let (out, hit) = envelope_mesh(&rib, &frame, &tris, &[0, 1]);
        assert!(hit);
        // contact rides on the upper patch, with its friction
        assert!((out.point.z - 0.04).abs() < 1.0e-5);
        assert_eq!(out.friction, 1.0);
        assert!((out.depth - (0.15 - 0.08)).abs() < 1.0e-4);
    }

    #[test]
    fn sampling_agrees_with_the_geometric_model_on_a_flat_patch() {
        let rib = test_rib();
        let frame = frame_at(&rib, 0.1);
        let tris: Vec<TerrainTriangle> = TerrainTriangle::from_vertices(
            Point::new(-5.0, -5.0, 0.0),
            Point::new(5.0, -5.0, 0.0),
            Point::new(0.0, 5.0, 0.0),
            1.0,
        )
        .into_iter()
        .collect();
        let (sampled, s_hit) = envelope_mesh(&rib, &frame, &tris, &[0]);
        let (exact, g_hit) =
            crate::enveloping::geometric::envelope_mesh(&rib, &frame, &tris, &[0]);
        assert!(s_hit && g_hit);
        assert!((sampled.depth - 0.05).abs() < 1.0e-4);
        assert!((exact.depth - 0.05).abs() < 1.0e-4);
        assert!((sampled.point - exact.point).norm() < 1.0e-3);
    }
}
