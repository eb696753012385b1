// ==============================================================================
// geometric.rs - EXACT ENVELOPING (CIRCULAR-SEGMENT INTEGRATION)
// ------------------------------------------------------------------------------
// For every candidate triangle the disk/triangle chord is taken, the chord
// endpoints are expressed as angles around the disk center, and the exact
// circular-segment area between chord and rim is accumulated. Contact point,
// normal and friction are volume-weighted running sums over the chords.
//
// Flat ground needs no accumulation: a single disk/plane chord yields depth,
// footprint area and segment volume in closed form.
//
// Both entries are pure and total; every degenerate configuration collapses
// to the canonical no-contact output.
// ==============================================================================

use std::f32::consts::PI;

use parry3d::math::{Point, Vector};

use crate::enveloping::kernel;
use crate::enveloping::no_contact;
use crate::enveloping::types::{
    CHORD_EPS, ContactOutput, NORMAL_EPS, Rib, RibFrame, VOLUME_EPS,
};
use crate::terrain::{FlatTerrain, TerrainTriangle};

/// Exact enveloping of one rib against a candidate set of mesh triangles.
pub fn envelope_mesh(
    rib: &Rib,
    frame: &RibFrame,
    triangles: &[TerrainTriangle],
    candidates: &[usize],
) -> (ContactOutput, bool) {
    let axis = frame.axis;

    // in-disk basis for the chord angles
    let mut in_disk_up = frame.up - axis * frame.up.dot(&axis);
    let up_len = in_disk_up.norm();
    if up_len < NORMAL_EPS {
        // disk lying flat; the enveloping geometry is undefined
        return no_contact(rib, frame);
    }
    in_disk_up /= up_len;
    let in_disk_fwd = in_disk_up.cross(&axis);

    let mut area = 0.0;
    let mut volume = 0.0;
    let mut point_acc = Vector::zeros();
    let mut normal_acc = Vector::zeros();
    let mut friction_acc = 0.0;

    for &ti in candidates {
        let tri = &triangles[ti];
        let Some((p, q)) =
            kernel::triangle_disk_chord(&tri.shape, &frame.center, &axis, rib.radius, CHORD_EPS)
        else {
            continue;
        };

        let vp = p - frame.center;
        let vq = q - frame.center;
        let phi_p = vp.dot(&in_disk_up).atan2(vp.dot(&in_disk_fwd));
        let phi_q = vq.dot(&in_disk_up).atan2(vq.dot(&in_disk_fwd));
        let mut theta = kernel::wrap_angle(phi_q - phi_p).abs();
        // once the center is under the surface the penetrated side is the
        // major arc
        if tri.normal.dot(&(frame.center - tri.shape.a)) < 0.0 {
            theta = 2.0 * PI - theta;
        }
        if theta <= 0.0 {
            continue;
        }

        let seg_area = kernel::circular_segment_area(rib.radius, theta);
        let seg_volume = seg_area * rib.width;

        let mid = Point::from((p.coords + q.coords) * 0.5);
        let mut radial = frame.center - mid;
        let radial_len = radial.norm();
        if radial_len > NORMAL_EPS {
            radial /= radial_len;
        } else {
            radial = in_disk_up;
        }
        // triangle normal flattened into the disk plane
        let mut blend = radial;
        let tn = tri.normal - axis * tri.normal.dot(&axis);
        let tn_len = tn.norm();
        if tn_len > NORMAL_EPS {
            blend += tn / tn_len;
        }
        let blend_len = blend.norm();
        let blend = if blend_len > NORMAL_EPS {
            blend / blend_len
        } else {
            radial
        };

        area += seg_area;
        volume += seg_volume;
        point_acc += mid.coords * seg_volume;
        normal_acc += blend * seg_volume;
        friction_acc += tri.friction * seg_volume;
    }

    if volume < VOLUME_EPS {
        return no_contact(rib, frame);
    }

    let point = Point::from(point_acc / volume);
    let normal_len = normal_acc.norm();
    let normal = if normal_len > NORMAL_EPS {
        normal_acc / normal_len
    } else {
        frame.up
    };
    let depth = rib.radius - (point - frame.center).norm();

    (
        ContactOutput {
            point,
            normal,
            friction: friction_acc / volume,
            depth,
            area,
            volume,
        },
        true,
    )
}

/// Exact enveloping of one rib against the infinite flat ground.
pub fn envelope_flat(rib: &Rib, frame: &RibFrame, flat: &FlatTerrain) -> (ContactOutput, bool) {
    let plane_point = Point::new(0.0, 0.0, flat.height);
    let plane_normal = Vector::z();

    let Some(chord) = kernel::plane_disk_chord(
        &plane_point,
        &plane_normal,
        &frame.center,
        &frame.axis,
        rib.radius,
        CHORD_EPS,
    ) else {
        return no_contact(rib, frame);
    };

    let depth = rib.radius - chord.center_offset;
    if depth <= 0.0 {
        return no_contact(rib, frame);
    }

    let point = Point::from((chord.start.coords + chord.end.coords) * 0.5);
    (
        ContactOutput {
            point,
            normal: plane_normal,
            friction: flat.friction,
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
    use parry3d::math::Real;

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

    fn ground_patch(friction: Real) -> Vec<TerrainTriangle> {
        TerrainTriangle::from_vertices(
            Point::new(-5.0, -5.0, 0.0),
            Point::new(5.0, -5.0, 0.0),
            Point::new(0.0, 5.0, 0.0),
            friction,
        )
        .into_iter()
        .collect()
    }

    #[test]
    fn empty_candidate_set_is_no_contact() {
        let rib = test_rib();
        let frame = frame_at(&rib, 0.1);
        let (out, hit) = envelope_mesh(&rib, &frame, &[], &[]);
        assert!(!hit);
        assert_eq!(out.friction, 0.0);
        assert_eq!(out.depth, 0.0);
        assert_eq!(out.area, 0.0);
        assert_eq!(out.volume, 0.0);
        // fallback point is the lowest rim point, fallback normal the up axis
        assert!((out.point - Point::new(0.0, 0.0, -0.05)).norm() < 1.0e-6);
        assert!((out.normal - Vector::z()).norm() < 1.0e-6);
    }

    #[test]
    fn single_patch_depth_and_point() {
        let rib = test_rib();
        let frame = frame_at(&rib, 0.1);
        let tris = ground_patch(0.9);
        let (out, hit) = envelope_mesh(&rib, &frame, &tris, &[0]);
        assert!(hit);
        assert!((out.depth - 0.05).abs() < 1.0e-4);
        assert!((out.point - Point::new(0.0, 0.0, 0.0)).norm() < 1.0e-3);
        assert!((out.normal - Vector::z()).norm() < 1.0e-3);
        assert!((out.friction - 0.9).abs() < 1.0e-6);
        // the angular segment integral matches the depth-form closed form
        let expected_volume = kernel::patch_volume(rib.radius, 0.05, rib.width);
        assert!((out.volume - expected_volume).abs() < 1.0e-6);
    }

    #[test]
    fn hovering_rib_makes_no_contact() {
        let rib = test_rib();
        let frame = frame_at(&rib, 0.5);
        let tris = ground_patch(1.0);
        let (_, hit) = envelope_mesh(&rib, &frame, &tris, &[0]);
        assert!(!hit);
    }

    #[test]
    fn flat_ground_closed_forms() {
        let rib = test_rib();
        let frame = frame_at(&rib, 0.1);
        let flat = FlatTerrain::new(0.0, 1.0);
        let (out, hit) = envelope_flat(&rib, &frame, &flat);
        assert!(hit);
        let (r, d, w) = (0.15f32, 0.05f32, 0.1f32);
        assert!((out.depth - d).abs() < 1.0e-6);
        assert!((out.area - 2.0 * (d * (2.0 * r - d)).sqrt() * w).abs() < 1.0e-7);
        let expected_volume =
            (r * r * ((r - d) / r).acos() - (r - d) * (d * (2.0 * r - d)).sqrt()) * w;
        assert!((out.volume - expected_volume).abs() < 1.0e-7);
        assert_eq!(out.friction, 1.0);
    }

    #[test]
    fn flat_ground_area_and_volume_grow_with_depth() {
        let rib = test_rib();
        let flat = FlatTerrain::new(0.0, 1.0);
        let mut last = (0.0, 0.0);
        // footprint grows up to full sinkage at d = r, volume up to d = 2r
        for step in 1..=14 {
            let depth = step as Real * 0.01;
            let frame = frame_at(&rib, rib.radius - depth);
            let (out, hit) = envelope_flat(&rib, &frame, &flat);
            assert!(hit);
            assert!(out.area > last.0, "area must grow strictly at d={depth}");
            assert!(out.volume > last.1, "volume must grow strictly at d={depth}");
            last = (out.area, out.volume);
        }
        // past half sinkage the volume keeps growing
        let mut last_volume = 0.0;
        for step in 1..=29 {
            let depth = step as Real * 0.01;
            let frame = frame_at(&rib, rib.radius - depth);
            let (out, _) = envelope_flat(&rib, &frame, &flat);
            assert!(out.volume > last_volume);
            last_volume = out.volume;
        }
    }

    #[test]
    fn deep_penetration_uses_the_major_arc() {
        // center below the surface: the penetrated region exceeds half a disk
        let rib = test_rib();
        let frame = frame_at(&rib, -0.05);
        let tris = ground_patch(1.0);
        let (out, hit) = envelope_mesh(&rib, &frame, &tris, &[0]);
        assert!(hit);
        let half_disk = 0.5 * PI * rib.radius * rib.radius * rib.width;
        assert!(out.volume > half_disk);
        // agreement with the flat closed form at d = r + 0.05
        let expected = kernel::patch_volume(rib.radius, 0.2, rib.width);
        assert!((out.volume - expected).abs() < 1.0e-5);
    }
}
