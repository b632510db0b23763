//! Rigid transforms with tangent-space uncertainty.
//!
//! Conventions:
//! - A `Transform` maps points expressed in a child frame into its parent
//!   frame: `p_parent = T * p_child`. Equivalently it is the pose of the
//!   child expressed in the parent.
//! - Uncertainty is a left perturbation `T_true = exp(ξ) · T` with
//!   `ξ = (ρ, φ)`: translation first, rotation second.

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Matrix6, Point3, Rotation3, Translation3, UnitQuaternion,
    Vector3,
};
use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Tolerance used when accepting a 4×4 matrix as a rigid transform.
const RIGIDITY_TOLERANCE: f64 = 1e-6;

/// Deterministic rigid 3-D transform. Carried on the wire as a row-major
/// 4×4 matrix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[[f64; 4]; 4]", into = "[[f64; 4]; 4]")]
pub struct Transform(Isometry3<f64>);

impl Transform {
    pub fn identity() -> Self {
        Self(Isometry3::identity())
    }

    pub fn from_isometry(iso: Isometry3<f64>) -> Self {
        Self(iso)
    }

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self(Isometry3::translation(x, y, z))
    }

    pub fn from_parts(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self(Isometry3::from_parts(Translation3::from(translation), rotation))
    }

    /// Translation followed by roll/pitch/yaw (radians, applied as
    /// `Rz(yaw) · Ry(pitch) · Rx(roll)`).
    pub fn from_xyz_rpy(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self::from_parts(
            Vector3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        )
    }

    /// Accept a homogeneous matrix. The upper-left block must be a proper
    /// rotation and the bottom row `[0 0 0 1]`.
    pub fn from_matrix(m: &Matrix4<f64>) -> Result<Self, TypesError> {
        if !m.iter().all(|v| v.is_finite()) {
            return Err(TypesError::NonFinite);
        }
        let bottom = m.fixed_view::<1, 4>(3, 0);
        let expected_bottom = nalgebra::RowVector4::new(0.0, 0.0, 0.0, 1.0);
        if (bottom - expected_bottom).norm() > RIGIDITY_TOLERANCE {
            return Err(TypesError::NotRigid("bottom row must be [0 0 0 1]".into()));
        }

        let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        if (r.transpose() * r - Matrix3::identity()).norm() > RIGIDITY_TOLERANCE {
            return Err(TypesError::NotRigid("rotation block is not orthonormal".into()));
        }
        if r.determinant() <= 0.0 {
            return Err(TypesError::NotRigid("rotation block is a reflection".into()));
        }

        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
        let translation = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        Ok(Self::from_parts(translation, rotation))
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        self.0.to_homogeneous()
    }

    pub fn is_finite(&self) -> bool {
        self.to_matrix().iter().all(|v| v.is_finite())
    }

    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.0
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.0.translation.vector
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.0.rotation
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// `self · other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Transform) -> Self {
        Self(self.0 * other.0)
    }

    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.0.transform_point(p)
    }

    /// Distance between the two poses, split into translation and rotation.
    pub fn delta(&self, other: &Transform) -> PoseDelta {
        PoseDelta {
            translation: (self.translation() - other.translation()).norm(),
            rotation: self.rotation().rotation_to(&other.rotation()).angle(),
        }
    }

    /// SE(3) adjoint in `(ρ, φ)` ordering: `[[R, [t]× R], [0, R]]`.
    pub fn adjoint(&self) -> Matrix6<f64> {
        let r = self.0.rotation.to_rotation_matrix().into_inner();
        let t = self.translation();
        let mut adj = Matrix6::zeros();
        adj.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
        adj.fixed_view_mut::<3, 3>(0, 3).copy_from(&(skew(&t) * r));
        adj.fixed_view_mut::<3, 3>(3, 3).copy_from(&r);
        adj
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl TryFrom<[[f64; 4]; 4]> for Transform {
    type Error = TypesError;

    fn try_from(rows: [[f64; 4]; 4]) -> Result<Self, Self::Error> {
        let m = Matrix4::from_fn(|r, c| rows[r][c]);
        Self::from_matrix(&m)
    }
}

impl From<Transform> for [[f64; 4]; 4] {
    fn from(t: Transform) -> Self {
        let m = t.to_matrix();
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = m[(r, c)];
            }
        }
        rows
    }
}

/// Skew-symmetric matrix `[v]×` such that `[v]× u = v × u`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// 6×6 covariance in the transform's tangent space, row-major on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 6]; 6]", into = "[[f64; 6]; 6]")]
pub struct Covariance(pub Matrix6<f64>);

impl Covariance {
    pub fn zero() -> Self {
        Self(Matrix6::zeros())
    }

    /// Independent translation and rotation variances.
    pub fn isotropic(translation_var: f64, rotation_var: f64) -> Self {
        let mut m = Matrix6::zeros();
        for i in 0..3 {
            m[(i, i)] = translation_var;
            m[(i + 3, i + 3)] = rotation_var;
        }
        Self(m)
    }

    pub fn trace(&self) -> f64 {
        self.0.trace()
    }

    /// Entries must be finite and variances non-negative.
    pub fn validate(&self) -> Result<(), TypesError> {
        if !self.0.iter().all(|v| v.is_finite()) {
            return Err(TypesError::NonFinite);
        }
        if let Some(i) = (0..6).find(|&i| self.0[(i, i)] < 0.0) {
            return Err(TypesError::InvalidCovariance(format!(
                "negative variance {} at index {i}",
                self.0[(i, i)]
            )));
        }
        Ok(())
    }

    /// `A · Σ · Aᵀ`
    pub fn transformed(&self, a: &Matrix6<f64>) -> Self {
        Self(a * self.0 * a.transpose())
    }
}

impl Default for Covariance {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<[[f64; 6]; 6]> for Covariance {
    fn from(rows: [[f64; 6]; 6]) -> Self {
        Self(Matrix6::from_fn(|r, c| rows[r][c]))
    }
}

impl From<Covariance> for [[f64; 6]; 6] {
    fn from(c: Covariance) -> Self {
        let mut rows = [[0.0; 6]; 6];
        for (r, row) in rows.iter_mut().enumerate() {
            for (col, v) in row.iter_mut().enumerate() {
                *v = c.0[(r, col)];
            }
        }
        rows
    }
}

impl std::ops::Add for Covariance {
    type Output = Covariance;

    fn add(self, rhs: Covariance) -> Covariance {
        Covariance(self.0 + rhs.0)
    }
}

/// Transform with first-order Gaussian uncertainty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UncertainTransform {
    pub transform: Transform,
    pub covariance: Covariance,
}

impl UncertainTransform {
    pub fn new(transform: Transform, covariance: Covariance) -> Self {
        Self {
            transform,
            covariance,
        }
    }

    /// A transform known exactly.
    pub fn certain(transform: Transform) -> Self {
        Self::new(transform, Covariance::zero())
    }

    /// Reject non-finite transforms and malformed covariances.
    pub fn validate(&self) -> Result<(), TypesError> {
        if !self.transform.is_finite() {
            return Err(TypesError::NonFinite);
        }
        self.covariance.validate()
    }

    /// `(exp(ξ)·T)⁻¹ = exp(-Ad(T⁻¹)ξ)·T⁻¹`, hence `Σ' = Ad(T⁻¹) Σ Ad(T⁻¹)ᵀ`.
    pub fn inverse(&self) -> Self {
        let inv = self.transform.inverse();
        Self {
            covariance: self.covariance.transformed(&inv.adjoint()),
            transform: inv,
        }
    }

    /// `self · other` with `Σ = Σ_self + Ad(T_self) Σ_other Ad(T_self)ᵀ`.
    /// The two inputs are treated as independent.
    pub fn compose(&self, other: &UncertainTransform) -> Self {
        Self {
            transform: self.transform.compose(&other.transform),
            covariance: self.covariance
                + other.covariance.transformed(&self.transform.adjoint()),
        }
    }
}

/// Difference between two poses.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseDelta {
    /// Euclidean distance between the origins
    pub translation: f64,
    /// Angle of the relative rotation, radians in `[0, π]`
    pub rotation: f64,
}

/// Change thresholds below which estimated pose updates are suppressed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Epsilon {
    pub translation: f64,
    pub rotation: f64,
}

impl Epsilon {
    pub fn new(translation: f64, rotation: f64) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn exceeded_by(&self, delta: &PoseDelta) -> bool {
        delta.translation > self.translation || delta.rotation > self.rotation
    }
}

/// Axis-aligned box given by two corner points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Build from any two opposite corners.
    pub fn from_corners(a: [f64; 3], b: [f64; 3]) -> Self {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for i in 0..3 {
            min[i] = a[i].min(b[i]);
            max[i] = a[i].max(b[i]);
        }
        Self { min, max }
    }

    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }
}

/// Ball given by center and radius.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: [f64; 3],
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: [f64; 3], radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        (p - Vector3::from(self.center)).norm() <= self.radius
    }
}
