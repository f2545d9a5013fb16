use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use ads_apriltag::{DetectorParams, Family, FamilyType, ImageU8Borrowed, PoseParams};

use crate::{Error, Frame, Result};

/// Pinhole camera intrinsic parameters, in pixels.
///
/// The layout of the camera matrix is
///
/// ```text
/// | fx  0 cx |
/// |  0 fy cy |
/// |  0  0  1 |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Default for CameraIntrinsics {
    /// Calibration of a Microsoft HD 3000 webcam, from the ROS camera
    /// calibration tool.
    fn default() -> Self {
        Self {
            fx: 622.27892,
            fy: 622.97536,
            cx: 333.70651,
            cy: 211.43233,
        }
    }
}

/// A single tag detection with its pose in the camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub id: i32,
    pub hamming: i32,
    pub decision_margin: f32,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    /// Center of the tag in image pixel coordinates.
    pub center: [f64; 2],
    /// Corners of the tag in image pixel coordinates.
    pub corners: [[f64; 2]; 4],
}

/// Finds tags in a frame and estimates their pose.
///
/// Detections are returned in the order reported by the underlying detector.
pub trait TagDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        camera: &CameraIntrinsics,
        tag_size_meters: f64,
    ) -> Result<Vec<RawDetection>>;
}

/// A [TagDetector] backed by the AprilTag C library.
pub struct AprilTagDetector {
    td: ads_apriltag::Detector,
}

impl AprilTagDetector {
    pub fn new(families: &[FamilyType], params: &DetectorParams) -> Self {
        let mut td = ads_apriltag::Detector::new();
        for family_type in families {
            td.add_family(Family::new(*family_type));
        }
        td.set_params(params);
        debug!(
            "AprilTag detector with {} tag families, {params:?}",
            td.num_families()
        );
        Self { td }
    }
}

impl TagDetector for AprilTagDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        camera: &CameraIntrinsics,
        tag_size_meters: f64,
    ) -> Result<Vec<RawDetection>> {
        let width: i32 = frame
            .width()
            .try_into()
            .map_err(|_| Error::Detector("frame too wide".into()))?;
        let height: i32 = frame
            .height()
            .try_into()
            .map_err(|_| Error::Detector("frame too tall".into()))?;
        let im = ImageU8Borrowed::new(width, height, width, frame.data()).ok_or_else(|| {
            Error::Detector(format!(
                "buffer of {} bytes too small for {}x{} image",
                frame.data().len(),
                width,
                height
            ))
        })?;
        let detections = self.td.detect(im.inner());

        let pose_params = PoseParams {
            tag_size: tag_size_meters,
            fx: camera.fx,
            fy: camera.fy,
            cx: camera.cx,
            cy: camera.cy,
        };

        let result = detections
            .as_slice()
            .iter()
            .map(|det| {
                let pose = det.estimate_pose(&pose_params);
                trace!("tag {}: pose object-space error {:e}", det.id(), pose.error);
                let r = &pose.rotation;
                RawDetection {
                    id: det.id(),
                    hamming: det.hamming(),
                    decision_margin: det.decision_margin(),
                    rotation: Matrix3::new(
                        r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1],
                        r[2][2],
                    ),
                    translation: Vector3::from(pose.translation),
                    center: *det.center(),
                    corners: *det.corners(),
                }
            })
            .collect();
        Ok(result)
    }
}
