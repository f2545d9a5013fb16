mod common;

use approx::assert_abs_diff_eq;
use test_log::test;

use ads_apriltag::{DetectorParams, FamilyType};
use apriltag_telemetry::{
    AprilTagDetector, CameraIntrinsics, FrameOutcome, FramePipeline, PipelineSettings, Telemetry,
    TagDetector,
};

use common::{tag36h11_frame, RecordingPublisher};

fn detector() -> AprilTagDetector {
    AprilTagDetector::new(&[FamilyType::Family36H11], &DetectorParams::default())
}

#[test]
fn detects_rendered_tag_with_pose() {
    let camera = CameraIntrinsics::default();
    // 200 px tag: the black border is 160 px wide.
    let frame = tag36h11_frame(5, 200, 640, 480);
    let detections = detector().detect(&frame, &camera, 0.1397).unwrap();
    assert_eq!(detections.len(), 1);

    let det = &detections[0];
    assert_eq!(det.id, 5);
    assert_eq!(det.hamming, 0);
    let rrt = det.rotation * det.rotation.transpose();
    assert_abs_diff_eq!(rrt, nalgebra::Matrix3::identity(), epsilon = 1e-6);
    assert_abs_diff_eq!(det.translation[2], 0.1397 * camera.fx / 160.0, epsilon = 0.01);
}

#[test]
fn rendered_tag_is_published() {
    let mut p = FramePipeline::new(
        detector(),
        RecordingPublisher::default(),
        PipelineSettings::default(),
    );
    let outcome = p.process_frame(&tag36h11_frame(5, 200, 640, 480));
    let record = match outcome {
        FrameOutcome::Published(record) => record,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(record.tag_id, 5);
    assert_abs_diff_eq!(record.pitch_deg, 0.0, epsilon = 1.0);
    assert_abs_diff_eq!(record.tz, 0.5433, epsilon = 0.01);
    // The tag center is left of the principal point.
    assert_abs_diff_eq!(record.tx, -0.012, epsilon = 0.005);
    assert_eq!(p.publisher().published, vec![Telemetry::Detection(record)]);
    assert_eq!(p.miss_tracker().count(), 0);
}

#[test]
fn blank_frame_publishes_sentinel() {
    let mut p = FramePipeline::new(
        detector(),
        RecordingPublisher::default(),
        PipelineSettings::default(),
    );
    let frame = apriltag_telemetry::Frame::new(0, 0, 64, 48, vec![128; 64 * 48]).unwrap();
    assert_eq!(p.process_frame(&frame), FrameOutcome::NoDetection);
    assert_eq!(p.publisher().published, vec![Telemetry::NoDetection]);
}
