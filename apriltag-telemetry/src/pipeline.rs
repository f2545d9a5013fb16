//! Processing of a single frame, from detection to published telemetry.

use tracing::{debug, error, info, warn};

use crate::{
    detector::{CameraIntrinsics, RawDetection, TagDetector},
    gate::QualityGate,
    miss::{MissPolicy, MissTracker},
    pose::decompose,
    selection::SelectionStrategy,
    sink::FrameSink,
    telemetry::{SENTINEL_TAG_ID, Telemetry, TelemetryPublisher, TelemetryRecord},
    Frame,
};

/// Fixed parameters of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub camera: CameraIntrinsics,
    pub tag_size_meters: f64,
    pub gate: QualityGate,
    pub selection: SelectionStrategy,
    pub miss_policy: MissPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            camera: CameraIntrinsics::default(),
            tag_size_meters: crate::config::DEFAULT_TAG_SIZE_METERS,
            gate: QualityGate::default(),
            selection: SelectionStrategy::default(),
            miss_policy: MissPolicy::default(),
        }
    }
}

/// Why a detection was not published.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// The detection failed the [QualityGate].
    Quality { hamming: i32, decision_margin: f32 },
    /// The pose decomposition was not finite.
    NumericDegenerate,
}

/// What happened with a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// A detection was accepted and its record published.
    Published(TelemetryRecord),
    /// No tag was detected and the sentinel was published.
    NoDetection,
    /// A tag was detected but rejected. Nothing was published.
    Rejected { tag_id: i32, reason: Rejection },
    /// The detector returned an error. Nothing was published.
    DetectorFailed,
}

/// Detects, gates, decomposes and publishes, one frame at a time.
pub struct FramePipeline<D, P> {
    detector: D,
    publisher: P,
    sink: Option<Box<dyn FrameSink>>,
    settings: PipelineSettings,
    misses: MissTracker,
}

impl<D: TagDetector, P: TelemetryPublisher> FramePipeline<D, P> {
    pub fn new(detector: D, publisher: P, settings: PipelineSettings) -> Self {
        Self {
            detector,
            publisher,
            sink: None,
            settings,
            misses: MissTracker::new(),
        }
    }

    /// Also pass every frame to `sink`.
    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn miss_tracker(&self) -> &MissTracker {
        &self.misses
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Consume the pipeline, returning the detector and publisher.
    pub fn into_parts(self) -> (D, P) {
        (self.detector, self.publisher)
    }

    fn publish(&mut self, msg: &Telemetry) {
        if let Err(e) = self.publisher.publish(msg) {
            warn!("telemetry not delivered: {e}");
        }
    }

    fn on_missed(&mut self) {
        self.misses.on_missed();
        debug!("consecutive missed frames: {}", self.misses.count());
    }

    /// Run one iteration of the pipeline on `frame`.
    ///
    /// At most one publish action happens per call.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutcome {
        let (src, seq) = (frame.source_index(), frame.seq());
        let detections = match self.detector.detect(
            frame,
            &self.settings.camera,
            self.settings.tag_size_meters,
        ) {
            Ok(detections) => detections,
            Err(e) => {
                error!("source {src} frame {seq}: {e}");
                self.show(frame, None);
                return FrameOutcome::DetectorFailed;
            }
        };

        let selected = self.settings.selection.select(&detections);
        let outcome = match selected {
            None => {
                self.publish(&Telemetry::NoDetection);
                if self.settings.miss_policy.counts_absent() {
                    self.on_missed();
                }
                info!("source {src} frame {seq}: no tag detected, published Tag ID {SENTINEL_TAG_ID}");
                FrameOutcome::NoDetection
            }
            Some(det) => self.gate_and_publish(src, seq, det),
        };
        self.show(frame, selected);
        outcome
    }

    fn gate_and_publish(&mut self, src: usize, seq: usize, det: &RawDetection) -> FrameOutcome {
        if !self
            .settings
            .gate
            .accepts(det.hamming, det.decision_margin)
        {
            info!(
                "source {src} frame {seq}: tag {} rejected, hamming {}, decision margin {:.1}",
                det.id, det.hamming, det.decision_margin
            );
            return self.reject(
                det.id,
                Rejection::Quality {
                    hamming: det.hamming,
                    decision_margin: det.decision_margin,
                },
            );
        }

        let pose = decompose(&det.rotation, &det.translation);
        if !pose.is_finite() {
            warn!(
                "source {src} frame {seq}: tag {} rejected, degenerate pose {:?}",
                det.id, pose
            );
            return self.reject(det.id, Rejection::NumericDegenerate);
        }

        self.misses.on_accepted();
        let record = TelemetryRecord::new(det.id, &pose);
        self.publish(&Telemetry::Detection(record));
        debug!(
            "yaw {:.2} pitch {:.2} roll {:.2} tx {:.4} ty {:.4} tz {:.4}",
            pose.yaw_deg, pose.pitch_deg, pose.roll_deg, pose.tx, pose.ty, pose.tz
        );
        info!("source {src} frame {seq}: {record}");
        FrameOutcome::Published(record)
    }

    fn reject(&mut self, tag_id: i32, reason: Rejection) -> FrameOutcome {
        if self.settings.miss_policy.counts_rejected() {
            self.on_missed();
        }
        FrameOutcome::Rejected { tag_id, reason }
    }

    fn show(&mut self, frame: &Frame, detection: Option<&RawDetection>) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.show(frame, detection) {
                warn!("frame sink: {e}");
            }
        }
    }
}
