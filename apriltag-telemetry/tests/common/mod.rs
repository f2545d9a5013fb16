#![allow(dead_code)]

use std::collections::VecDeque;

use nalgebra::{Matrix3, Vector3};

use apriltag_telemetry::{
    CameraIntrinsics, Error, Frame, RawDetection, Result, SourceDescriptor, SourceOpener,
    StopSignal, TagDetector, Telemetry, TelemetryPublisher, VideoSource,
};

pub fn frame(source_index: usize, seq: usize) -> Frame {
    Frame::new(source_index, seq, 8, 8, vec![0; 64]).unwrap()
}

pub fn detection(id: i32, hamming: i32, decision_margin: f32) -> RawDetection {
    RawDetection {
        id,
        hamming,
        decision_margin,
        rotation: Matrix3::identity(),
        translation: Vector3::new(1.0, 2.0, 3.0),
        center: [4.0, 4.0],
        corners: [[2.0, 2.0], [6.0, 2.0], [6.0, 6.0], [2.0, 6.0]],
    }
}

/// Returns scripted detections, one entry per call, then nothing.
#[derive(Default)]
pub struct StubDetector {
    pub script: VecDeque<Result<Vec<RawDetection>>>,
    /// Every frame passed to `detect`, as (source index, seq).
    pub seen: Vec<(usize, usize)>,
    /// Raise a shutdown on this signal when the given call number (0-based)
    /// is detecting.
    pub stop_during_call: Option<(usize, StopSignal)>,
}

impl StubDetector {
    pub fn new(script: Vec<Vec<RawDetection>>) -> Self {
        Self {
            script: script.into_iter().map(Ok).collect(),
            ..Default::default()
        }
    }
}

impl TagDetector for StubDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        _camera: &CameraIntrinsics,
        _tag_size_meters: f64,
    ) -> Result<Vec<RawDetection>> {
        if let Some((call, stop)) = &self.stop_during_call {
            if *call == self.seen.len() {
                stop.request_shutdown();
            }
        }
        self.seen.push((frame.source_index(), frame.seq()));
        self.script.pop_front().unwrap_or_else(|| Ok(vec![]))
    }
}

/// Keeps every published message.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Vec<Telemetry>,
    pub fail: bool,
}

impl TelemetryPublisher for RecordingPublisher {
    fn publish(&mut self, msg: &Telemetry) -> Result<()> {
        if self.fail {
            return Err(Error::Publish("network table unreachable".into()));
        }
        self.published.push(*msg);
        Ok(())
    }
}

/// A source yielding `n_frames` frames, then an optional read error.
pub struct CountingSource {
    source_index: usize,
    next: usize,
    n_frames: usize,
    error_at_end: bool,
}

impl VideoSource for CountingSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next == self.n_frames {
            if self.error_at_end {
                return Err(Error::SourceRead("truncated file".into()));
            }
            return Ok(None);
        }
        let f = frame(self.source_index, self.next);
        self.next += 1;
        Ok(Some(f))
    }
}

/// Opens file descriptors named `<n>.frames` (or `<n>.broken` to end with a
/// read error) as sources of `n` frames. Device descriptors fail to open.
#[derive(Default)]
pub struct StubOpener {
    pub opened: Vec<usize>,
}

impl SourceOpener for StubOpener {
    fn open(
        &mut self,
        source_index: usize,
        descriptor: &SourceDescriptor,
    ) -> Result<Box<dyn VideoSource>> {
        let unavailable = || Error::SourceUnavailable {
            descriptor: descriptor.to_string(),
            reason: "no such stub".into(),
        };
        let SourceDescriptor::File(path) = descriptor else {
            return Err(unavailable());
        };
        let n_frames: usize = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(unavailable)?;
        let error_at_end = path.extension().and_then(|e| e.to_str()) == Some("broken");
        self.opened.push(source_index);
        Ok(Box::new(CountingSource {
            source_index,
            next: 0,
            n_frames,
            error_at_end,
        }))
    }
}

pub fn file(name: &str) -> SourceDescriptor {
    SourceDescriptor::File(name.into())
}

/// A `width`x`height` white frame with tag36h11 `id` centered on it, `tag_px`
/// pixels wide including the white border of the tag.
pub fn tag36h11_frame(id: u32, tag_px: usize, width: usize, height: usize) -> Frame {
    let (tile, tile_w, tile_h) = unsafe {
        let tf = apriltag_sys::tag36h11_create();
        let im = apriltag_sys::apriltag_to_image(tf, id as _);
        assert!(!im.is_null());
        let (w, h, stride) = (
            (*im).width as usize,
            (*im).height as usize,
            (*im).stride as usize,
        );
        let src = std::slice::from_raw_parts((*im).buf, h * stride);
        let tile: Vec<u8> = src
            .chunks_exact(stride)
            .flat_map(|row| row[..w].iter().copied())
            .collect();
        apriltag_sys::image_u8_destroy(im);
        apriltag_sys::tag36h11_destroy(tf);
        (tile, w, h)
    };

    let mut data = vec![255u8; width * height];
    let (x0, y0) = ((width - tag_px) / 2, (height - tag_px) / 2);
    for y in 0..tag_px {
        for x in 0..tag_px {
            data[(y0 + y) * width + x0 + x] = tile[(y * tile_h / tag_px) * tile_w + x * tile_w / tag_px];
        }
    }
    Frame::new(0, 0, width as u32, height as u32, data).unwrap()
}
