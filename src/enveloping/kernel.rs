// ==============================================================================
// kernel.rs - GEOMETRIC PREDICATES FOR THE ENVELOPING ALGORITHMS
// ------------------------------------------------------------------------------
// Total, tolerance-parameterized intersection tests:
// - triangle_disk_chord: where a terrain triangle slices a rib disk
// - plane_disk_chord:    where an infinite plane slices a rib disk
// - line_triangle_intersection / line_plane_intersection (full lines, both
//   directions, so sampling casts can hit above their origin)
// - the closed-form circular-segment quantities shared by both contact models
//
// Nothing in here errors: a degenerate configuration is a None.
// ==============================================================================

use std::f32::consts::PI;

use parry3d::math::{Point, Real, Vector};
use parry3d::shape::Triangle;

/// Chord of a disk cut by an infinite plane.
#[derive(Clone, Copy, Debug)]
pub struct PlaneDiskChord {
    pub start: Point<Real>,
    pub end: Point<Real>,
    /// Signed in-disk distance from the disk center to the chord line,
    /// positive when the center sits on the plane normal's side.
    pub center_offset: Real,
}

#[inline]
pub fn approx_eq(a: Real, b: Real, tol: Real) -> bool {
    (a - b).abs() <= tol
}

/// Wrap an angle into (-pi, pi].
#[inline]
pub fn wrap_angle(a: Real) -> Real {
    let two_pi = 2.0 * PI;
    let mut a = a % two_pi;
    if a > PI {
        a -= two_pi;
    } else if a <= -PI {
        a += two_pi;
    }
    a
}

/// Area of the circular segment whose arc subtends `angle` radians.
#[inline]
pub fn circular_segment_area(radius: Real, angle: Real) -> Real {
    0.5 * radius * radius * (angle - angle.sin())
}

/// Footprint area of a circle of radius `r` sunk to depth `d`, swept over
/// the rib width: `2·sqrt(d(2r-d))·w`.
#[inline]
pub fn patch_area(radius: Real, depth: Real, width: Real) -> Real {
    let d = depth.clamp(0.0, 2.0 * radius);
    2.0 * (d * (2.0 * radius - d)).max(0.0).sqrt() * width
}

/// Interpenetration volume at depth `d`: the circular-segment area
/// `r²·acos((r-d)/r) - (r-d)·sqrt(d(2r-d))` swept over the rib width.
#[inline]
pub fn patch_volume(radius: Real, depth: Real, width: Real) -> Real {
    let d = depth.clamp(0.0, 2.0 * radius);
    let rd = radius - d;
    let chord_half = (d * (2.0 * radius - d)).max(0.0).sqrt();
    (radius * radius * (rd / radius).clamp(-1.0, 1.0).acos() - rd * chord_half) * width
}

/// Intersection of an infinite line with a triangle (Möller-Trumbore without
/// the forward-ray restriction).
pub fn line_triangle_intersection(
    origin: &Point<Real>,
    dir: &Vector<Real>,
    tri: &Triangle,
    eps: Real,
) -> Option<Point<Real>> {
    let edge1 = tri.b - tri.a;
    let edge2 = tri.c - tri.a;

    let pvec = dir.cross(&edge2);
    let det = edge1.dot(&pvec);
    if det.abs() < eps {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = origin - tri.a;

    let u = tvec.dot(&pvec) * inv_det;
    if u < -eps || u > 1.0 + eps {
        return None;
    }

    let qvec = tvec.cross(&edge1);
    let v = dir.dot(&qvec) * inv_det;
    if v < -eps || u + v > 1.0 + eps {
        return None;
    }

    let t = edge2.dot(&qvec) * inv_det;
    Some(origin + dir * t)
}

/// Intersection of an infinite line with an infinite plane.
pub fn line_plane_intersection(
    origin: &Point<Real>,
    dir: &Vector<Real>,
    plane_point: &Point<Real>,
    plane_normal: &Vector<Real>,
    eps: Real,
) -> Option<Point<Real>> {
    let denom = dir.dot(plane_normal);
    if denom.abs() < eps {
        return None;
    }
    let t = (plane_point - origin).dot(plane_normal) / denom;
    Some(origin + dir * t)
}

/// Chord where `tri` crosses the plane of a disk, clipped to the disk circle.
/// Returns None when the triangle does not straddle the disk plane or the
/// clipped chord degenerates below `eps`.
pub fn triangle_disk_chord(
    tri: &Triangle,
    center: &Point<Real>,
    axis: &Vector<Real>,
    radius: Real,
    eps: Real,
) -> Option<(Point<Real>, Point<Real>)> {
    let verts = [tri.a, tri.b, tri.c];
    let mut dist = [0.0; 3];
    for (d, v) in dist.iter_mut().zip(&verts) {
        let s = axis.dot(&(v - center));
        *d = if s.abs() < eps { 0.0 } else { s };
    }

    let mut hits = [Point::origin(); 2];
    let mut n_hits = 0;
    for i in 0..3 {
        if n_hits == 2 {
            break;
        }
        let j = (i + 1) % 3;
        let (di, dj) = (dist[i], dist[j]);
        if di == 0.0 && dj == 0.0 {
            // edge lying in the disk plane; its endpoints come from the
            // neighbouring edges
            continue;
        }
        if di * dj > 0.0 {
            continue;
        }
        let t = di / (di - dj);
        hits[n_hits] = verts[i] + (verts[j] - verts[i]) * t;
        n_hits += 1;
    }
    if n_hits < 2 {
        return None;
    }

    clip_segment_to_circle(&hits[0], &hits[1], center, radius, eps)
}

/// Chord where an infinite plane crosses a disk. None when the disk is
/// parallel to the plane or the circle does not reach it.
pub fn plane_disk_chord(
    plane_point: &Point<Real>,
    plane_normal: &Vector<Real>,
    center: &Point<Real>,
    axis: &Vector<Real>,
    radius: Real,
    eps: Real,
) -> Option<PlaneDiskChord> {
    // in-disk direction of steepest approach to the plane
    let n_t = plane_normal - axis * plane_normal.dot(axis);
    let nt_len = n_t.norm();
    if nt_len < eps {
        return None;
    }
    let toward_plane = n_t / nt_len;

    // in-disk distance from the center to the intersection line
    let height = plane_normal.dot(&(center - plane_point));
    let offset = height / nt_len;
    if offset.abs() >= radius {
        return None;
    }

    let half = (radius * radius - offset * offset).sqrt();
    let along = axis.cross(&toward_plane);
    let foot = center - toward_plane * offset;
    Some(PlaneDiskChord {
        start: foot - along * half,
        end: foot + along * half,
        center_offset: offset,
    })
}

/// Clip a segment to the inside of a circle living in the same plane.
fn clip_segment_to_circle(
    p: &Point<Real>,
    q: &Point<Real>,
    center: &Point<Real>,
    radius: Real,
    eps: Real,
) -> Option<(Point<Real>, Point<Real>)> {
    let d = q - p;
    let len2 = d.norm_squared();
    if len2 < eps * eps {
        return None;
    }
    let m = p - center;

    // |m + t·d|² = r²
    let a = len2;
    let b = 2.0 * m.dot(&d);
    let c = m.norm_squared() - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc <= 0.0 {
        return None;
    }
    let s = disc.sqrt();
    let t0 = (-b - s) / (2.0 * a);
    let t1 = (-b + s) / (2.0 * a);

    let u0 = t0.max(0.0);
    let u1 = t1.min(1.0);
    if u1 <= u0 {
        return None;
    }
    let start = p + d * u0;
    let end = p + d * u1;
    if (end - start).norm() < eps {
        return None;
    }
    Some((start, end))
}
