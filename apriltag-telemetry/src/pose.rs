//! Decomposition of a tag pose into Euler angles and translation offsets.

use nalgebra::{Matrix3, Vector3};

/// Euler angles (degrees) and translation of a tag relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseAngles {
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

impl PoseAngles {
    /// True if all angles and offsets are finite numbers.
    pub fn is_finite(&self) -> bool {
        [
            self.yaw_deg,
            self.pitch_deg,
            self.roll_deg,
            self.tx,
            self.ty,
            self.tz,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Decompose rotation `r` and translation `t` into yaw, pitch and roll.
///
/// Uses the Z-Y-X (yaw-pitch-roll) convention, i.e. the inverse of
/// [nalgebra::Rotation3::from_euler_angles]. `r` is assumed orthonormal and is
/// not validated. Near pitch = +/-90 degrees (gimbal lock) `r[(2,1)]` and
/// `r[(2,2)]` both approach zero and yaw and roll become numerically unstable;
/// no correction is applied. NaN input propagates to the output, so callers
/// should check [PoseAngles::is_finite].
pub fn decompose(r: &Matrix3<f64>, t: &Vector3<f64>) -> PoseAngles {
    let yaw = r[(1, 0)].atan2(r[(0, 0)]);
    let pitch = (-r[(2, 0)]).atan2((r[(2, 1)].powi(2) + r[(2, 2)].powi(2)).sqrt());
    let roll = r[(2, 1)].atan2(r[(2, 2)]);
    PoseAngles {
        yaw_deg: yaw.to_degrees(),
        pitch_deg: pitch.to_degrees(),
        roll_deg: roll.to_degrees(),
        tx: t[0],
        ty: t[1],
        tz: t[2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    #[test]
    fn identity() {
        let p = decompose(&Matrix3::identity(), &Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(p.yaw_deg, 0.0);
        assert_eq!(p.pitch_deg, 0.0);
        assert_eq!(p.roll_deg, 0.0);
        assert_eq!((p.tx, p.ty, p.tz), (1.0, 2.0, 3.0));
        assert!(p.is_finite());
    }

    #[test]
    fn reconstructs_rotation() {
        let cases = [
            (10.0f64, -20.0f64, 30.0f64),
            (-170.0, 45.0, 5.0),
            (90.0, 0.0, -90.0),
            (0.0, 80.0, 120.0),
            (-33.3, -60.0, 179.0),
        ];
        for (roll, pitch, yaw) in cases {
            let r = Rotation3::from_euler_angles(
                roll.to_radians(),
                pitch.to_radians(),
                yaw.to_radians(),
            );
            let p = decompose(r.matrix(), &Vector3::zeros());
            let rebuilt = Rotation3::from_euler_angles(
                p.roll_deg.to_radians(),
                p.pitch_deg.to_radians(),
                p.yaw_deg.to_radians(),
            );
            assert_relative_eq!(rebuilt.matrix(), r.matrix(), epsilon = 1e-6);
            assert_relative_eq!(p.pitch_deg, pitch, epsilon = 1e-6);
        }
    }

    #[test]
    fn nan_is_not_finite() {
        let mut r = Matrix3::identity();
        r[(2, 0)] = f64::NAN;
        let p = decompose(&r, &Vector3::new(0.0, 0.0, 1.0));
        assert!(!p.is_finite());
        assert!(p.pitch_deg.is_nan());

        let p = decompose(&Matrix3::identity(), &Vector3::new(f64::INFINITY, 0.0, 1.0));
        assert!(!p.is_finite());
    }
}
