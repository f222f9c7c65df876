//! Video decode/encode through the `ffmpeg` and `ffprobe` executables.
//!
//! Frames cross the process boundary as raw `rgb24` over pipes, so nothing
//! here links against libav.

use image::RgbImage;
use serde::Deserialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("{0} not found; install ffmpeg or set FFMPEG_PATH/FFPROBE_PATH")]
    ToolMissing(String),

    #[error("Failed to probe video: {0}")]
    ProbeFailed(String),

    #[error("Upload contains no decodable video stream")]
    NoVideoStream,

    #[error("Video encoding failed: {0}")]
    EncodeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Pulls decoded frames out of a video.
pub trait FrameReader {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError>;
}

/// Accepts annotated frames for the output video.
pub trait FrameWriter {
    fn write(&mut self, frame: &RgbImage) -> Result<(), VideoError>;
}

/// Location of the ffmpeg tool pair.
#[derive(Debug, Clone)]
pub struct VideoTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoInfo {
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264; plays in browsers
    Libx264,
    Mpeg4,
}

impl VideoCodec {
    fn args(&self) -> &'static [&'static str] {
        match self {
            Self::Libx264 => &["-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p"],
            Self::Mpeg4 => &["-c:v", "mpeg4", "-q:v", "5", "-pix_fmt", "yuv420p"],
        }
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

fn spawn_error(tool: &Path, err: io::Error) -> VideoError {
    if err.kind() == io::ErrorKind::NotFound {
        VideoError::ToolMissing(tool.display().to_string())
    } else {
        VideoError::Io(err)
    }
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn parse_probe(json: &[u8]) -> Result<VideoInfo, VideoError> {
    let output: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| VideoError::ProbeFailed(e.to_string()))?;

    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or(VideoError::NoVideoStream)?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(VideoError::NoVideoStream),
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(1.0);

    Ok(VideoInfo {
        width,
        height,
        // Whole frames per second, never zero
        fps: (fps as u32).max(1),
    })
}

impl VideoTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn probe(&self, path: &Path) -> Result<VideoInfo, VideoError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,avg_frame_rate,r_frame_rate",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| spawn_error(&self.ffprobe, e))?;

        if !output.status.success() {
            return Err(VideoError::ProbeFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_probe(&output.stdout)
    }

    /// Prefer H.264 when this ffmpeg build has libx264.
    pub fn select_codec(&self) -> VideoCodec {
        let encoders = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .stderr(Stdio::null())
            .output();

        match encoders {
            Ok(output) if String::from_utf8_lossy(&output.stdout).contains(" libx264 ") => {
                VideoCodec::Libx264
            }
            Ok(_) => {
                tracing::warn!("ffmpeg has no libx264 encoder, falling back to mpeg4");
                VideoCodec::Mpeg4
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not list ffmpeg encoders, falling back to mpeg4");
                VideoCodec::Mpeg4
            }
        }
    }
}

/// Decoded RGB frames from a video file.
pub struct FrameSource {
    child: Child,
    stdout: ChildStdout,
    info: VideoInfo,
    buffer: Vec<u8>,
}

impl FrameSource {
    pub fn open(tools: &VideoTools, path: &Path, info: VideoInfo) -> Result<Self, VideoError> {
        let mut child = Command::new(&tools.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-noautorotate", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&tools.ffmpeg, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VideoError::Io(io::Error::other("ffmpeg stdout not captured")))?;

        Ok(Self {
            child,
            stdout,
            info,
            buffer: vec![0; info.frame_bytes()],
        })
    }
}

impl FrameReader for FrameSource {
    /// A trailing partial frame is dropped.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.stdout.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled < self.buffer.len() {
            if filled > 0 {
                tracing::warn!(bytes = filled, "Discarding truncated trailing frame");
            }
            return Ok(None);
        }

        let frame = RgbImage::from_raw(self.info.width, self.info.height, self.buffer.clone())
            .ok_or_else(|| VideoError::Io(io::Error::other("frame buffer size mismatch")))?;
        Ok(Some(frame))
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Encodes RGB frames into an mp4 file.
pub struct FrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frames: u64,
}

impl FrameSink {
    pub fn create(
        tools: &VideoTools,
        path: &Path,
        info: VideoInfo,
        codec: VideoCodec,
    ) -> Result<Self, VideoError> {
        let size = format!("{}x{}", info.width, info.height);
        let fps = info.fps.to_string();

        let mut child = Command::new(&tools.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s", &size, "-r", &fps, "-i", "-"])
            // yuv420p needs even dimensions
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(codec.args())
            .args(["-movflags", "+faststart", "-f", "mp4"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&tools.ffmpeg, e))?;

        let stdin = child.stdin.take();
        // ffmpeg stalls once an unread stderr pipe fills
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut log = String::new();
                let _ = pipe.read_to_string(&mut log);
                log
            })
        });

        tracing::debug!(?codec, %size, fps = info.fps, "Started video encoder");

        Ok(Self {
            child,
            stdin,
            stderr,
            frames: 0,
        })
    }

    /// Close the input and wait for ffmpeg to finalise the file.
    pub fn finish(mut self) -> Result<u64, VideoError> {
        drop(self.stdin.take());

        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(VideoError::EncodeFailed(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(self.frames)
    }
}

impl FrameWriter for FrameSink {
    fn write(&mut self, frame: &RgbImage) -> Result<(), VideoError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VideoError::EncodeFailed("encoder input already closed".into()))?;
        stdin.write_all(frame.as_raw())?;
        self.frames += 1;
        Ok(())
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}
