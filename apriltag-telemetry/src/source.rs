use std::{
    collections::VecDeque,
    ffi::OsString,
    io::{BufRead, BufReader, Read},
    path::PathBuf,
    process::{Child, ChildStdout, Command, Stdio},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// An 8-bit monochrome image from a video source.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    source_index: usize,
    seq: usize,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Create a frame with tightly packed rows (stride equal to width).
    ///
    /// Returns `None` if `data` does not hold exactly `width * height` bytes.
    pub fn new(
        source_index: usize,
        seq: usize,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            source_index,
            seq,
            width,
            height,
            data,
        })
    }

    /// Index of the source in the configured source list.
    pub fn source_index(&self) -> usize {
        self.source_index
    }

    /// Position of the frame within its source, starting at 0.
    pub fn seq(&self) -> usize {
        self.seq
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Where frames come from: a camera device index or a video file.
///
/// Parsed from a string: a non-negative integer selects a camera, anything
/// else is a file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceDescriptor {
    Device(u32),
    File(PathBuf),
}

impl std::str::FromStr for SourceDescriptor {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Config("empty source descriptor".into()));
        }
        if let Ok(idx) = s.parse::<u32>() {
            return Ok(SourceDescriptor::Device(idx));
        }
        Ok(SourceDescriptor::File(PathBuf::from(s)))
    }
}

impl TryFrom<String> for SourceDescriptor {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SourceDescriptor> for String {
    fn from(d: SourceDescriptor) -> String {
        d.to_string()
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SourceDescriptor::Device(idx) => write!(f, "{idx}"),
            SourceDescriptor::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A stream of frames.
pub trait VideoSource {
    /// Block until the next frame is available.
    ///
    /// Returns `Ok(None)` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens [VideoSource]s from descriptors.
pub trait SourceOpener {
    fn open(
        &mut self,
        source_index: usize,
        descriptor: &SourceDescriptor,
    ) -> Result<Box<dyn VideoSource>>;
}

/// Decodes video with an `ffmpeg` child process piping YUV4MPEG2 to us.
pub struct FfmpegSource {
    source_index: usize,
    seq: usize,
    y4m_decoder: y4m::Decoder<ChildStdout>,
    ffmpeg_child: Child,
}

/// Arguments selecting the ffmpeg input for `descriptor`.
fn ffmpeg_input_args(descriptor: &SourceDescriptor) -> Result<Vec<OsString>> {
    match descriptor {
        SourceDescriptor::File(path) => Ok(vec!["-i".into(), path.clone().into_os_string()]),
        SourceDescriptor::Device(idx) => {
            if cfg!(target_os = "linux") {
                Ok(vec![
                    "-f".into(),
                    "v4l2".into(),
                    "-i".into(),
                    format!("/dev/video{idx}").into(),
                ])
            } else if cfg!(target_os = "macos") {
                Ok(vec![
                    "-f".into(),
                    "avfoundation".into(),
                    "-i".into(),
                    format!("{idx}").into(),
                ])
            } else {
                Err(Error::SourceUnavailable {
                    descriptor: descriptor.to_string(),
                    reason: "camera devices by index are not supported on this platform".into(),
                })
            }
        }
    }
}

/// The complete ffmpeg command line for `descriptor`, writing 8-bit
/// grayscale YUV4MPEG2 to stdout.
fn ffmpeg_args(descriptor: &SourceDescriptor) -> Result<Vec<OsString>> {
    let mut args: Vec<OsString> = vec!["-nostats".into(), "-hide_banner".into(), "-nostdin".into()];
    args.extend(ffmpeg_input_args(descriptor)?);
    args.extend([
        "-pix_fmt".into(),
        "gray".into(),
        "-f".into(),
        "yuv4mpegpipe".into(),
        "pipe:".into(),
    ]);
    Ok(args)
}

/// Number of trailing ffmpeg stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 10;

/// Read ffmpeg's stderr to the end, logging each line, and return the last
/// [STDERR_TAIL_LINES] lines.
fn collect_stderr<R: Read>(rdr: R) -> String {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(rdr).lines().map_while(|l| l.ok()) {
        debug!("ffmpeg: {line}");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

impl FfmpegSource {
    pub fn open(source_index: usize, descriptor: &SourceDescriptor) -> Result<Self> {
        let unavailable = |reason: String| Error::SourceUnavailable {
            descriptor: descriptor.to_string(),
            reason,
        };

        let args = ffmpeg_args(descriptor)?;

        let show_ffmpeg = match std::env::var_os("FFMPEG_SHOW") {
            Some(v) => &v != "0",
            None => false,
        };

        let cmdline = args
            .iter()
            .map(|x| x.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if show_ffmpeg {
            println!("ffmpeg {cmdline}");
        } else {
            debug!("ffmpeg {cmdline}");
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::piped());
        if !show_ffmpeg {
            cmd.stderr(Stdio::piped());
        }

        let mut ffmpeg_child = cmd
            .spawn()
            .map_err(|e| unavailable(format!("when spawning ffmpeg: {e}")))?;
        let ffmpeg_out = ffmpeg_child
            .stdout
            .take()
            .ok_or_else(|| unavailable("ffmpeg stdout not captured".into()))?;
        let stderr_reader = match ffmpeg_child.stderr.take() {
            Some(stderr) => match std::thread::Builder::new()
                .name("ffmpeg-stderr".into())
                .spawn(move || collect_stderr(stderr))
            {
                Ok(handle) => Some(handle),
                Err(e) => {
                    let _ = ffmpeg_child.kill();
                    let _ = ffmpeg_child.wait();
                    return Err(e.into());
                }
            },
            None => None,
        };

        let y4m_decoder = match y4m::decode(ffmpeg_out) {
            Ok(d) => d,
            Err(e) => {
                // ffmpeg usually exits immediately if the input cannot be opened.
                let _ = ffmpeg_child.kill();
                let _ = ffmpeg_child.wait();
                let stderr = stderr_reader
                    .and_then(|h| h.join().ok())
                    .unwrap_or_default();
                let reason = if stderr.is_empty() {
                    format!("no video stream: {e}")
                } else {
                    format!("no video stream: {e}\nffmpeg: {stderr}")
                };
                return Err(unavailable(reason));
            }
        };

        Ok(Self {
            source_index,
            seq: 0,
            y4m_decoder,
            ffmpeg_child,
        })
    }
}

impl VideoSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let w: u32 = self.y4m_decoder.get_width().try_into().map_err(|_| {
            Error::SourceRead(format!("width {} out of range", self.y4m_decoder.get_width()))
        })?;
        let h: u32 = self.y4m_decoder.get_height().try_into().map_err(|_| {
            Error::SourceRead(format!("height {} out of range", self.y4m_decoder.get_height()))
        })?;
        match self.y4m_decoder.read_frame() {
            Ok(f) => {
                let frame = Frame::new(
                    self.source_index,
                    self.seq,
                    w,
                    h,
                    f.get_y_plane().to_vec(),
                )
                .ok_or_else(|| Error::SourceRead("unexpected luma plane size".into()))?;
                self.seq += 1;
                Ok(Some(frame))
            }
            Err(y4m::Error::EOF) => Ok(None),
            Err(err) => Err(Error::SourceRead(err.to_string())),
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Err(e) = self.ffmpeg_child.kill() {
            warn!("failed to kill ffmpeg: {e}");
        }
        let _ = self.ffmpeg_child.wait();
    }
}

/// Opens every descriptor with [FfmpegSource].
#[derive(Debug, Default)]
pub struct FfmpegOpener {}

impl SourceOpener for FfmpegOpener {
    fn open(
        &mut self,
        source_index: usize,
        descriptor: &SourceDescriptor,
    ) -> Result<Box<dyn VideoSource>> {
        Ok(Box::new(FfmpegSource::open(source_index, descriptor)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_descriptors() {
        assert_eq!(
            "0".parse::<SourceDescriptor>().unwrap(),
            SourceDescriptor::Device(0)
        );
        assert_eq!(
            " 2 ".parse::<SourceDescriptor>().unwrap(),
            SourceDescriptor::Device(2)
        );
        assert_eq!(
            "media/single_tag.mp4".parse::<SourceDescriptor>().unwrap(),
            SourceDescriptor::File("media/single_tag.mp4".into())
        );
        assert!("".parse::<SourceDescriptor>().is_err());
        assert_eq!(SourceDescriptor::Device(3).to_string(), "3");
    }

    #[test]
    fn frame_size_checked() {
        assert!(Frame::new(0, 0, 4, 2, vec![0; 8]).is_some());
        assert!(Frame::new(0, 0, 4, 2, vec![0; 7]).is_none());
    }

    #[test]
    fn ffmpeg_file_args() {
        let args = ffmpeg_input_args(&SourceDescriptor::File("a.mp4".into())).unwrap();
        assert_eq!(args, vec![OsString::from("-i"), OsString::from("a.mp4")]);
    }

    #[test]
    fn ffmpeg_output_is_8bit_gray() {
        let args = ffmpeg_args(&SourceDescriptor::File("deep.mov".into())).unwrap();
        let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();
        let pix_fmt = args.iter().position(|a| *a == "-pix_fmt").unwrap();
        assert_eq!(args[pix_fmt + 1], "gray");
        let input = args.iter().position(|a| *a == "deep.mov").unwrap();
        assert!(input < pix_fmt);
        assert_eq!(args.last(), Some(&"pipe:"));
    }

    #[test]
    fn stderr_tail_kept() {
        let text: String = (0..15).map(|i| format!("line {i}\n")).collect();
        let tail = collect_stderr(std::io::Cursor::new(text));
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "line 5");
        assert_eq!(lines[9], "line 14");
        assert_eq!(collect_stderr(std::io::empty()), "");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn ffmpeg_device_args() {
        let args = ffmpeg_input_args(&SourceDescriptor::Device(1)).unwrap();
        assert_eq!(args.last().unwrap(), &OsString::from("/dev/video1"));
    }
}
