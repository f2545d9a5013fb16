use std::{io::Write, path::Path};

use tracing::info;

use crate::{Error, Frame, RawDetection, Result};

/// Receives every processed frame, e.g. for recording or display.
pub trait FrameSink {
    /// `detection` is the detection selected for telemetry, if any.
    fn show(&mut self, frame: &Frame, detection: Option<&RawDetection>) -> Result<()>;
}

const OVERLAY_VALUE: u8 = 255;

/// Draw a line on a tightly packed mono8 image, clipping to its bounds.
fn draw_line(buf: &mut [u8], width: u32, height: u32, p0: [f64; 2], p1: [f64; 2]) {
    if !(p0.iter().chain(p1.iter()).all(|v| v.is_finite())) {
        return;
    }
    let (mut x0, mut y0) = (p0[0].round() as i64, p0[1].round() as i64);
    let (x1, y1) = (p1[0].round() as i64, p1[1].round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        if (0..width as i64).contains(&x0) && (0..height as i64).contains(&y0) {
            buf[(y0 * width as i64 + x0) as usize] = OVERLAY_VALUE;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Copy of `frame` with the outline and center of `detection` drawn on it.
pub fn annotate(frame: &Frame, detection: Option<&RawDetection>) -> Vec<u8> {
    let mut buf = frame.data().to_vec();
    if let Some(det) = detection {
        let (w, h) = (frame.width(), frame.height());
        for i in 0..4 {
            draw_line(&mut buf, w, h, det.corners[i], det.corners[(i + 1) % 4]);
        }
        let [cx, cy] = det.center;
        draw_line(&mut buf, w, h, [cx - 3.0, cy], [cx + 3.0, cy]);
        draw_line(&mut buf, w, h, [cx, cy - 3.0], [cx, cy + 3.0]);
    }
    buf
}

#[derive(Debug)]
struct Y4MOptions {
    raten: usize,
    rated: usize,
}

enum Writer {
    NotStarted(Box<dyn Write>),
    Started {
        encoder: y4m::Encoder<Box<dyn Write>>,
        width: u32,
        height: u32,
    },
    /// Placeholder value for internal use
    Undefined,
}

/// Records annotated frames to a monochrome YUV4MPEG2 (`.y4m`) file.
///
/// The header is written when the first frame arrives. All frames, from all
/// sources, must have the same size.
pub struct Y4mRecorder {
    writer: Writer,
    opts: Y4MOptions,
    n_frames: usize,
}

impl Y4mRecorder {
    pub fn create<P: AsRef<Path>>(path: P, fps: u32) -> Result<Self> {
        let fd = std::fs::File::create(path.as_ref())?;
        info!("recording annotated frames to {}", path.as_ref().display());
        Ok(Self::from_writer(
            Box::new(std::io::BufWriter::new(fd)),
            fps,
        ))
    }

    pub fn from_writer(wtr: Box<dyn Write>, fps: u32) -> Self {
        Self {
            writer: Writer::NotStarted(wtr),
            opts: Y4MOptions {
                raten: fps.max(1) as usize,
                rated: 1,
            },
            n_frames: 0,
        }
    }

    /// Number of frames written.
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }
}

impl FrameSink for Y4mRecorder {
    fn show(&mut self, frame: &Frame, detection: Option<&RawDetection>) -> Result<()> {
        let writer = std::mem::replace(&mut self.writer, Writer::Undefined);
        let (mut encoder, width, height) = match writer {
            Writer::NotStarted(fd) => {
                let encoder = y4m::encode(
                    frame.width() as usize,
                    frame.height() as usize,
                    y4m::Ratio::new(self.opts.raten, self.opts.rated),
                )
                .with_colorspace(y4m::Colorspace::Cmono)
                .write_header(fd)?;
                (encoder, frame.width(), frame.height())
            }
            Writer::Started {
                encoder,
                width,
                height,
            } => (encoder, width, height),
            Writer::Undefined => {
                return Err(Error::Sink("recorder in failed state".into()));
            }
        };

        if (width, height) != (frame.width(), frame.height()) {
            self.writer = Writer::Started {
                encoder,
                width,
                height,
            };
            return Err(Error::Sink(format!(
                "frame size changed from {width}x{height} to {}x{}",
                frame.width(),
                frame.height()
            )));
        }

        let buf = annotate(frame, detection);
        let no_chroma: &[u8] = &[];
        let y4m_frame = y4m::Frame::new([&buf[..], no_chroma, no_chroma], None);
        let result = encoder.write_frame(&y4m_frame);
        self.writer = Writer::Started {
            encoder,
            width,
            height,
        };
        result?;
        self.n_frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    fn det() -> RawDetection {
        RawDetection {
            id: 1,
            hamming: 0,
            decision_margin: 50.0,
            rotation: Matrix3::identity(),
            translation: Vector3::new(0.0, 0.0, 1.0),
            center: [4.0, 4.0],
            corners: [[2.0, 2.0], [6.0, 2.0], [6.0, 6.0], [2.0, 6.0]],
        }
    }

    #[test]
    fn annotate_draws_outline() {
        let frame = Frame::new(0, 0, 10, 10, vec![0; 100]).unwrap();
        let buf = annotate(&frame, Some(&det()));
        assert_eq!(buf[2 * 10 + 2], OVERLAY_VALUE);
        assert_eq!(buf[2 * 10 + 4], OVERLAY_VALUE);
        assert_eq!(buf[6 * 10 + 6], OVERLAY_VALUE);
        assert_eq!(buf[4 * 10 + 4], OVERLAY_VALUE);
        assert_eq!(buf[0], 0);
        assert_eq!(annotate(&frame, None), frame.data());
    }

    #[test]
    fn annotate_clips_out_of_bounds() {
        let frame = Frame::new(0, 0, 4, 4, vec![0; 16]).unwrap();
        let mut d = det();
        d.corners = [[-10.0, -10.0], [20.0, -10.0], [20.0, 20.0], [f64::NAN, 20.0]];
        let buf = annotate(&frame, Some(&d));
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn record_y4m() -> Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("out.y4m");
        {
            let mut rec = Y4mRecorder::create(&path, 30)?;
            for seq in 0..3 {
                let frame = Frame::new(0, seq, 8, 6, vec![10; 48]).unwrap();
                rec.show(&frame, Some(&det()))?;
            }
            assert_eq!(rec.n_frames(), 3);
            let other = Frame::new(1, 0, 4, 4, vec![0; 16]).unwrap();
            assert!(rec.show(&other, None).is_err());
        }
        let contents = std::fs::read(&path)?;
        assert!(contents.starts_with(b"YUV4MPEG2 W8 H6"));
        Ok(())
    }
}
