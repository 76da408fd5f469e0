//! 2x3 affine transforms and their partial-affine decomposition.
//!
//! The stabilizer models inter-frame camera motion as a partial affine
//! transform (translation + rotation + uniform scale, 4 degrees of freedom).
//! Transforms are stored as the full 2x3 matrix `[a b tx; c d ty]` so that
//! point mapping and composition stay ordinary matrix algebra, while
//! smoothing and classification work on the decomposed components.

/// A 2x3 affine transform mapping `(x, y)` to
/// `(a*x + b*y + tx, c*x + d*y + ty)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Row-major linear part and translation: `[a b tx; c d ty]`.
    pub a: f32,
    /// See `a`.
    pub b: f32,
    /// Horizontal translation in pixels.
    pub tx: f32,
    /// See `a`.
    pub c: f32,
    /// See `a`.
    pub d: f32,
    /// Vertical translation in pixels.
    pub ty: f32,
}

/// The partial-affine view of a [`Transform`]: translation, rotation and the
/// natural logarithm of the uniform scale.
///
/// Working in log-scale makes scale averaging symmetric: a zoom-in by 2x and
/// a zoom-out by 2x cancel exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Decomposed {
    /// Horizontal translation in pixels.
    pub tx: f32,
    /// Vertical translation in pixels.
    pub ty: f32,
    /// Rotation angle in radians, in `(-pi, pi]`.
    pub theta: f32,
    /// Natural logarithm of the uniform scale.
    pub log_scale: f32,
}

impl Transform {
    /// The identity transform.
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        tx: 0.0,
        c: 0.0,
        d: 1.0,
        ty: 0.0,
    };

    /// Builds a partial-affine transform from translation, rotation and
    /// uniform scale.
    pub fn from_similarity(tx: f32, ty: f32, theta: f32, scale: f32) -> Transform {
        let (sin, cos) = theta.sin_cos();
        Transform {
            a: scale * cos,
            b: -scale * sin,
            tx,
            c: scale * sin,
            d: scale * cos,
            ty,
        }
    }

    /// Maps a point through the transform.
    #[inline]
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.b * y + self.tx,
            self.c * x + self.d * y + self.ty,
        )
    }

    /// Returns the transform equivalent to applying `self` first and then
    /// `other`.
    pub fn then(&self, other: &Transform) -> Transform {
        Transform {
            a: other.a * self.a + other.b * self.c,
            b: other.a * self.b + other.b * self.d,
            tx: other.a * self.tx + other.b * self.ty + other.tx,
            c: other.c * self.a + other.d * self.c,
            d: other.c * self.b + other.d * self.d,
            ty: other.c * self.tx + other.d * self.ty + other.ty,
        }
    }

    /// Returns the inverse transform, or `None` when the linear part is
    /// singular or non-finite.
    pub fn invert(&self) -> Option<Transform> {
        let det = self.a * self.d - self.b * self.c;
        if !det.is_finite() || det.abs() < 1e-10 {
            return None;
        }
        let inv_det = 1.0 / det;
        let a = self.d * inv_det;
        let b = -self.b * inv_det;
        let c = -self.c * inv_det;
        let d = self.a * inv_det;
        Some(Transform {
            a,
            b,
            tx: -(a * self.tx + b * self.ty),
            c,
            d,
            ty: -(c * self.tx + d * self.ty),
        })
    }

    /// Decomposes the transform into its partial-affine components.
    ///
    /// The uniform scale is taken from the first column of the linear part,
    /// which is exact for transforms produced by
    /// [`from_similarity`](#method.from_similarity) and a least-squares
    /// approximation for general affine matrices.
    pub fn decompose(&self) -> Decomposed {
        let scale = (self.a * self.a + self.c * self.c).sqrt();
        Decomposed {
            tx: self.tx,
            ty: self.ty,
            theta: self.c.atan2(self.a),
            log_scale: if scale > 0.0 { scale.ln() } else { 0.0 },
        }
    }

    /// Returns true when every coefficient is finite.
    pub fn is_finite(&self) -> bool {
        self.a.is_finite()
            && self.b.is_finite()
            && self.tx.is_finite()
            && self.c.is_finite()
            && self.d.is_finite()
            && self.ty.is_finite()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::IDENTITY
    }
}

impl Decomposed {
    /// Recomposes the components into a transform matrix.
    pub fn recompose(&self) -> Transform {
        Transform::from_similarity(self.tx, self.ty, self.theta, self.log_scale.exp())
    }

    /// Scales every component by `strength`, the fraction of the correction
    /// to apply. At 0 the result recomposes to the identity, at 1 it is the
    /// full correction.
    pub fn scaled(&self, strength: f32) -> Decomposed {
        Decomposed {
            tx: self.tx * strength,
            ty: self.ty * strength,
            theta: self.theta * strength,
            log_scale: self.log_scale * strength,
        }
    }

    /// The combined motion magnitude of these components, in pixels.
    ///
    /// Rotation and scale are weighted so that their typical contribution is
    /// comparable to translation measured in pixels.
    pub fn magnitude(&self) -> f32 {
        const K_ROT: f32 = 50.0;
        const K_SCL: f32 = 100.0;
        (self.tx * self.tx + self.ty * self.ty).sqrt()
            + K_ROT * self.theta.abs()
            + K_SCL * self.log_scale.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn identity_maps_points_to_themselves() {
        let (x, y) = Transform::IDENTITY.apply(12.5, -3.0);
        assert_close(12.5, x, 1e-6);
        assert_close(-3.0, y, 1e-6);
    }

    #[test]
    fn decompose_recompose_round_trips() {
        let t = Transform::from_similarity(4.0, -2.5, 0.3, 1.2);
        let d = t.decompose();
        assert_close(4.0, d.tx, 1e-5);
        assert_close(-2.5, d.ty, 1e-5);
        assert_close(0.3, d.theta, 1e-5);
        assert_close(1.2f32.ln(), d.log_scale, 1e-5);
        let r = d.recompose();
        assert_close(t.a, r.a, 1e-5);
        assert_close(t.b, r.b, 1e-5);
        assert_close(t.c, r.c, 1e-5);
        assert_close(t.d, r.d, 1e-5);
    }

    #[test]
    fn invert_undoes_the_transform() {
        let t = Transform::from_similarity(10.0, 5.0, FRAC_PI_4, 0.8);
        let inv = t.invert().unwrap();
        let (x, y) = t.apply(3.0, 7.0);
        let (rx, ry) = inv.apply(x, y);
        assert_close(3.0, rx, 1e-4);
        assert_close(7.0, ry, 1e-4);
    }

    #[test]
    fn invert_rejects_singular_matrices() {
        let t = Transform {
            a: 0.0,
            b: 0.0,
            tx: 1.0,
            c: 0.0,
            d: 0.0,
            ty: 1.0,
        };
        assert!(t.invert().is_none());
    }

    #[test]
    fn then_composes_in_application_order() {
        let shift = Transform::from_similarity(5.0, 0.0, 0.0, 1.0);
        let double = Transform::from_similarity(0.0, 0.0, 0.0, 2.0);
        // Shift first, then scale: (1, 0) -> (6, 0) -> (12, 0).
        let (x, y) = shift.then(&double).apply(1.0, 0.0);
        assert_close(12.0, x, 1e-5);
        assert_close(0.0, y, 1e-5);
    }

    #[test]
    fn scaled_at_zero_strength_is_identity() {
        let d = Transform::from_similarity(9.0, -4.0, 0.2, 1.1)
            .decompose()
            .scaled(0.0);
        let t = d.recompose();
        assert_close(1.0, t.a, 1e-6);
        assert_close(0.0, t.tx, 1e-6);
        assert_close(0.0, t.ty, 1e-6);
    }
}
