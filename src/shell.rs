// ==============================================================================
// shell.rs - SHELL ORCHESTRATION + AGGREGATION
// ------------------------------------------------------------------------------
// The wheel's contact model: an ordered row of rib disks sharing one world
// pose. Every simulation step `setup` adopts the new pose, prunes candidate
// terrain per rib and drives each rib's enveloping call; the whole-shell
// accessors aggregate the per-rib outputs volume-weighted.
//
// Per-step flow against a mesh:
// - recompute the shell bounding box around the pose translation
// - one global spatial-tree query for candidate triangles
// - geometric method only: refine candidates per rib with the lateral
//   slab sign test (cheap, monotone superset)
// - envelope every rib, aggregate
//
// Candidate lists are step-local scratch; nothing persists across steps.
// ==============================================================================

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use parry3d::bounding_volume::Aabb;
use parry3d::math::{Point, Real, Vector};
use serde::{Deserialize, Serialize};

use crate::enveloping::{
    ContactOutput, EnvelopingMethod, NORMAL_EPS, ORTHONORMAL_TOL, Pose, Rib, RibFrame,
    SLAB_CULL_TOL, VOLUME_EPS, geometric, no_contact, sampling,
};
use crate::terrain::{FlatTerrain, TerrainMesh};

/// Cross-section shape a shell is sized from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ShellShape {
    /// Maximum cross-section radius, at the shell centerline.
    pub radius: Real,
    /// Total lateral width of the shell.
    pub width: Real,
    /// Radius drop from centerline to shoulder (parabolic crown;
    /// 0 = cylindrical).
    pub shoulder_drop: Real,
}

impl ShellShape {
    pub fn cylindrical(radius: Real, width: Real) -> Self {
        Self {
            radius,
            width,
            shoulder_drop: 0.0,
        }
    }
}

/// Terrain a `setup` call runs against.
#[derive(Clone, Copy)]
pub enum Terrain<'a> {
    Mesh(&'a TerrainMesh),
    Flat(&'a FlatTerrain),
}

/// Per-rib wire/report record for the host side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactReport {
    pub rib: usize,
    pub grounded: bool,
    pub point: [f32; 3],
    pub normal: [f32; 3],
    pub friction: f32,
    pub depth: f32,
    pub area: f32,
    pub volume: f32,
}

pub struct Shell {
    shape: ShellShape,
    ribs: Vec<Rib>,
    outputs: Vec<ContactOutput>,
    contacts: Vec<bool>,
    pose: Pose,
    bbox: Aabb,

    // step-local scratch, reused between setups
    global_candidates: Vec<usize>,
    rib_candidates: Vec<Vec<usize>>,
    vertex_side: Vec<[Real; 3]>,
}

impl Shell {
    pub fn new(rib_count: usize, shape: ShellShape) -> Self {
        assert!(shape.radius > 0.0, "shell radius must be positive");
        assert!(shape.width > 0.0, "shell width must be positive");
        let mut shell = Self {
            shape,
            ribs: Vec::new(),
            outputs: Vec::new(),
            contacts: Vec::new(),
            pose: Pose::identity(),
            bbox: Aabb::new_invalid(),
            global_candidates: Vec::new(),
            rib_candidates: Vec::new(),
            vertex_side: Vec::new(),
        };
        shell.resize(rib_count);
        shell
    }

    /// Re-derive all per-rib state for a new rib count. Outputs reset to the
    /// unknown sentinel.
    pub fn resize(&mut self, rib_count: usize) {
        assert!(rib_count > 0, "shell needs at least one rib");
        let rib_width = self.shape.width / rib_count as Real;

        self.ribs.clear();
        for i in 0..rib_count {
            let y = -self.shape.width * 0.5 + (i as Real + 0.5) * rib_width;
            let u = 2.0 * y / self.shape.width;
            let radius = self.shape.radius - self.shape.shoulder_drop * u * u;
            let slope =
                -8.0 * self.shape.shoulder_drop * y / (self.shape.width * self.shape.width);
            self.ribs.push(Rib {
                radius,
                center: Point::new(0.0, y, 0.0),
                normal: Vector::y(),
                width: rib_width,
                inclination: slope.atan(),
            });
        }

        self.outputs = vec![ContactOutput::unknown(); rib_count];
        self.contacts = vec![false; rib_count];
        self.rib_candidates = vec![Vec::new(); rib_count];
    }

    pub fn rib_count(&self) -> usize {
        self.ribs.len()
    }

    pub fn ribs(&self) -> &[Rib] {
        &self.ribs
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn bounding_box(&self) -> &Aabb {
        &self.bbox
    }

    fn max_radius(&self) -> Real {
        self.ribs.iter().fold(0.0, |m, r| m.max(r.radius))
    }

    // --------------------------------------------------
    // Per-step evaluation
    // --------------------------------------------------

    /// Adopt `pose` and evaluate every rib against `terrain`. Returns true
    /// iff at least one rib made contact.
    pub fn setup(
        &mut self,
        terrain: Terrain<'_>,
        pose: &Pose,
        method: EnvelopingMethod,
    ) -> bool {
        assert!(
            pose.is_orthonormal(ORTHONORMAL_TOL),
            "shell pose rotation must be orthonormal"
        );
        self.pose = *pose;

        let half = (self.max_radius() * self.max_radius()
            + 0.25 * self.shape.width * self.shape.width)
            .sqrt();
        let center = Point::from(self.pose.translation);
        self.bbox = Aabb::new(center - Vector::repeat(half), center + Vector::repeat(half));

        match terrain {
            Terrain::Mesh(mesh) => self.setup_mesh(mesh, method),
            Terrain::Flat(flat) => self.setup_flat(flat, method),
        }
    }

    fn setup_mesh(&mut self, mesh: &TerrainMesh, method: EnvelopingMethod) -> bool {
        mesh.tree().query_into(&self.bbox, &mut self.global_candidates);
        if self.global_candidates.is_empty() {
            for i in 0..self.ribs.len() {
                let frame = RibFrame::new(&self.ribs[i], &self.pose);
                let (out, hit) = no_contact(&self.ribs[i], &frame);
                self.outputs[i] = out;
                self.contacts[i] = hit;
            }
            return false;
        }

        if method == EnvelopingMethod::Geometric {
            self.refine_candidates(mesh);
        }

        let mut any = false;
        for i in 0..self.ribs.len() {
            let rib = self.ribs[i];
            let frame = RibFrame::new(&rib, &self.pose);
            let (out, hit) = match method {
                EnvelopingMethod::Geometric => geometric::envelope_mesh(
                    &rib,
                    &frame,
                    mesh.triangles(),
                    &self.rib_candidates[i],
                ),
                EnvelopingMethod::Sampling => sampling::envelope_mesh(
                    &rib,
                    &frame,
                    mesh.triangles(),
                    &self.global_candidates,
                ),
            };
            self.outputs[i] = out;
            self.contacts[i] = hit;
            any |= hit;
        }
        any
    }

    fn setup_flat(&mut self, flat: &FlatTerrain, method: EnvelopingMethod) -> bool {
        let mut any = false;
        for i in 0..self.ribs.len() {
            let rib = self.ribs[i];
            let frame = RibFrame::new(&rib, &self.pose);
            let (out, hit) = match method {
                EnvelopingMethod::Geometric => geometric::envelope_flat(&rib, &frame, flat),
                EnvelopingMethod::Sampling => sampling::envelope_flat(&rib, &frame, flat),
            };
            self.outputs[i] = out;
            self.contacts[i] = hit;
            any |= hit;
        }
        any
    }

    /// Lateral slab culling: a candidate survives for a rib unless all three
    /// of its vertices fall strictly on the same side of the rib's slab
    /// (vertex sign sum of ±3). Never drops a truly intersecting triangle.
    fn refine_candidates(&mut self, mesh: &TerrainMesh) {
        let lateral = self.pose.vector_to_world(&Vector::y());
        let origin = self.pose.translation;

        self.vertex_side.clear();
        for &ti in &self.global_candidates {
            let tri = &mesh.triangles()[ti].shape;
            self.vertex_side.push([
                lateral.dot(&(tri.a.coords - origin)),
                lateral.dot(&(tri.b.coords - origin)),
                lateral.dot(&(tri.c.coords - origin)),
            ]);
        }

        for (rib, list) in self.ribs.iter().zip(self.rib_candidates.iter_mut()) {
            list.clear();
            let lo = rib.center.y - rib.width * 0.5 - SLAB_CULL_TOL;
            let hi = rib.center.y + rib.width * 0.5 + SLAB_CULL_TOL;
            for (sides, &ti) in self.vertex_side.iter().zip(&self.global_candidates) {
                let mut sum = 0i32;
                for &s in sides {
                    sum += if s < lo {
                        -1
                    } else if s > hi {
                        1
                    } else {
                        0
                    };
                }
                if sum != 3 && sum != -3 {
                    list.push(ti);
                }
            }
        }
    }

    // --------------------------------------------------
    // Per-rib accessors
    // --------------------------------------------------

    pub fn rib_contact(&self, rib: usize) -> bool {
        self.contacts[rib]
    }

    pub fn rib_output(&self, rib: usize) -> &ContactOutput {
        &self.outputs[rib]
    }

    pub fn outputs(&self) -> &[ContactOutput] {
        &self.outputs
    }

    /// Contact-patch frame of one rib.
    pub fn rib_patch_frame(&self, rib: usize) -> Isometry3<Real> {
        let out = &self.outputs[rib];
        self.frame_from(&out.normal, &out.point)
    }

    /// ZXY-relative angles of one rib's patch frame, with the rib's static
    /// inclination taken out of the x rotation.
    pub fn rib_relative_angles(&self, rib: usize) -> Vector3<Real> {
        let mut angles = self.angles_from(&self.rib_patch_frame(rib));
        angles.x -= self.ribs[rib].inclination;
        angles
    }

    // --------------------------------------------------
    // Whole-shell aggregation
    // --------------------------------------------------

    /// True iff any rib is currently in contact.
    pub fn contact(&self) -> bool {
        self.contacts.iter().any(|&c| c)
    }

    /// Total contact-patch area (plain sum, extensive).
    pub fn area(&self) -> Real {
        self.outputs.iter().map(|o| o.area).sum()
    }

    /// Total interpenetration volume (plain sum, extensive).
    pub fn volume(&self) -> Real {
        self.outputs.iter().map(|o| o.volume).sum()
    }

    /// Volume-weighted mean depth (arithmetic mean when barely grazing).
    pub fn depth(&self) -> Real {
        self.weighted_scalar(|o| o.depth)
    }

    /// Volume-weighted mean friction (arithmetic mean when barely grazing).
    pub fn friction(&self) -> Real {
        self.weighted_scalar(|o| o.friction)
    }

    /// Volume-weighted mean contact point.
    pub fn contact_point(&self) -> Point<Real> {
        let total = self.volume();
        let n = self.outputs.len() as Real;
        let mut acc = Vector::zeros();
        if total < VOLUME_EPS {
            for o in &self.outputs {
                acc += o.point.coords;
            }
            Point::from(acc / n)
        } else {
            for o in &self.outputs {
                acc += o.point.coords * o.volume;
            }
            Point::from(acc / total)
        }
    }

    /// Volume-weighted mean contact normal, normalized.
    pub fn contact_normal(&self) -> Vector<Real> {
        let total = self.volume();
        let mut acc = Vector::zeros();
        if total < VOLUME_EPS {
            for o in &self.outputs {
                acc += o.normal;
            }
        } else {
            for o in &self.outputs {
                acc += o.normal * o.volume;
            }
        }
        let len = acc.norm();
        if len > NORMAL_EPS {
            acc / len
        } else {
            self.pose.vector_to_world(&Vector::z())
        }
    }

    fn weighted_scalar(&self, f: impl Fn(&ContactOutput) -> Real) -> Real {
        let total = self.volume();
        if total < VOLUME_EPS {
            self.outputs.iter().map(&f).sum::<Real>() / self.outputs.len() as Real
        } else {
            self.outputs.iter().map(|o| f(o) * o.volume).sum::<Real>() / total
        }
    }

    /// Whole-shell contact-patch frame: z = contact normal, x = lateral x
    /// normal (rolling direction), y completing the right-handed triad,
    /// translation = contact point.
    pub fn patch_frame(&self) -> Isometry3<Real> {
        let normal = self.contact_normal();
        let point = self.contact_point();
        self.frame_from(&normal, &point)
    }

    /// ZXY Euler decomposition of the rotation from the shell frame to the
    /// whole-shell patch frame, as (x, y, z) rotations.
    pub fn relative_angles(&self) -> Vector3<Real> {
        self.angles_from(&self.patch_frame())
    }

    fn frame_from(&self, normal: &Vector<Real>, point: &Point<Real>) -> Isometry3<Real> {
        let lateral = self.pose.vector_to_world(&Vector::y());
        let mut x = lateral.cross(normal);
        let len = x.norm();
        if len > NORMAL_EPS {
            x /= len;
        } else {
            // normal parallel to the lateral axis; fall back to the rolling
            // direction
            x = self.pose.vector_to_world(&Vector::x());
        }
        let y = normal.cross(&x);
        let rot = Matrix3::from_columns(&[x, y, *normal]);
        Isometry3::from_parts(
            Translation3::from(point.coords),
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot)),
        )
    }

    fn angles_from(&self, patch: &Isometry3<Real>) -> Vector3<Real> {
        let relative = self.pose.rotation.transpose()
            * patch.rotation.to_rotation_matrix().into_inner();
        let (x, y, z) = euler_zxy(&relative);
        Vector3::new(x, y, z)
    }

    /// Per-rib report records in a host-friendly array layout.
    pub fn report(&self) -> Vec<ContactReport> {
        self.outputs
            .iter()
            .enumerate()
            .map(|(i, o)| ContactReport {
                rib: i,
                grounded: self.contacts[i],
                point: [o.point.x, o.point.y, o.point.z],
                normal: [o.normal.x, o.normal.y, o.normal.z],
                friction: o.friction,
                depth: o.depth,
                area: o.area,
                volume: o.volume,
            })
            .collect()
    }
}

/// Decompose `r = Rz(z)·Rx(x)·Ry(y)`; returns (x, y, z).
fn euler_zxy(r: &Matrix3<Real>) -> (Real, Real, Real) {
    let x = r[(2, 1)].clamp(-1.0, 1.0).asin();
    let z = (-r[(0, 1)]).atan2(r[(1, 1)]);
    let y = (-r[(2, 0)]).atan2(r[(2, 2)]);
    (x, y, z)
}
