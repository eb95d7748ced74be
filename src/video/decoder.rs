//! ffmpeg subprocess decoding.

use crate::frame::{PixelFormat, VideoFrame};
use anyhow::{anyhow, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

/// Frames buffered between the decode thread and the render thread.
const CHANNEL_DEPTH: usize = 5;

/// A decoded frame with its position in the (looping) stream.
pub struct DecodedFrame {
    pub frame: VideoFrame,
    /// Monotonic across loops and seeks.
    pub sequence: u64,
    /// Playback time at which the frame is due.
    pub timestamp: f32,
}

/// What ffprobe reports about the first video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    /// Stream length in seconds, when the container knows it.
    pub duration: Option<f32>,
}

/// One run of the decode thread.
struct DecodeJob {
    path: PathBuf,
    info: ProbeInfo,
    /// Video position the first ffmpeg run starts at.
    start_position: f32,
    /// Playback time of the first frame.
    first_timestamp: f32,
    sequence: Arc<AtomicU64>,
}

/// Decodes a video into RGBA frames on a background thread, restarting
/// ffmpeg at the end of the stream so playback loops.
pub struct VideoDecoder {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub duration: Option<f32>,
    path: PathBuf,
    sequence: Arc<AtomicU64>,
    frame_rx: Receiver<DecodedFrame>,
    current_frame: Option<DecodedFrame>,
    next_frame: Option<DecodedFrame>,
    start_time: Option<f32>,
    finished: bool,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl VideoDecoder {
    /// Probes the video and starts decoding it.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening video via ffmpeg CLI: {:?}", path);

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,duration",
                "-of",
                "csv=p=0",
            ])
            .arg(&path)
            .output()
            .map_err(|e| anyhow!("Failed to run ffprobe: {}", e))?;
        if !output.status.success() {
            return Err(anyhow!("ffprobe failed: {}", String::from_utf8_lossy(&output.stderr)));
        }

        let info = parse_probe(&String::from_utf8(output.stdout)?)?;
        info!("Video: {}x{}, {:.2} fps, {:?}s", info.width, info.height, info.fps, info.duration);

        let sequence = Arc::new(AtomicU64::new(0));
        let (frame_rx, stop, thread) = spawn_decoder(DecodeJob {
            path: path.clone(),
            info,
            start_position: 0.0,
            first_timestamp: 0.0,
            sequence: sequence.clone(),
        })?;

        Ok(Self {
            width: info.width,
            height: info.height,
            fps: info.fps,
            duration: info.duration,
            path,
            sequence,
            frame_rx,
            current_frame: None,
            next_frame: None,
            start_time: None,
            finished: false,
            stop,
            thread: Some(thread),
        })
    }

    /// The newest frame due at `time`. Frames that are late are skipped.
    /// Playback time starts at the first call.
    pub fn frame_at(&mut self, time: f32) -> Option<&DecodedFrame> {
        let start = *self.start_time.get_or_insert(time);
        let playback_time = time - start;

        if let Some(frame) = &self.next_frame {
            if frame.timestamp > playback_time {
                return self.current_frame.as_ref();
            }
            self.current_frame = self.next_frame.take();
        }

        loop {
            match self.frame_rx.try_recv() {
                Ok(frame) if frame.timestamp <= playback_time => self.current_frame = Some(frame),
                Ok(frame) => {
                    self.next_frame = Some(frame);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                    break;
                }
            }
        }

        self.current_frame.as_ref()
    }

    /// Restarts decoding so the frame due at `time` is the one at that
    /// point of the video. The current frame stays until a new one arrives.
    pub fn seek(&mut self, time: f32) -> Result<()> {
        let start = *self.start_time.get_or_insert(time);
        let playback_time = (time - start).max(0.0);
        let position = seek_position(playback_time, self.duration);
        info!("Seeking {:?} to {:.2}s", self.path, position);

        self.stop_thread();
        self.next_frame = None;
        self.finished = false;

        let info = ProbeInfo {
            width: self.width,
            height: self.height,
            fps: self.fps,
            duration: self.duration,
        };
        let (frame_rx, stop, thread) = spawn_decoder(DecodeJob {
            path: self.path.clone(),
            info,
            start_position: position,
            first_timestamp: playback_time,
            sequence: self.sequence.clone(),
        })?;
        self.frame_rx = frame_rx;
        self.stop = stop;
        self.thread = Some(thread);
        Ok(())
    }

    /// True once the decode thread has exited.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn stop_thread(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Unblock a sender waiting on a full channel.
        while self.frame_rx.try_recv().is_ok() {}
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Video decode thread panicked");
            }
        }
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// Where in a looping video of `duration` seconds playback time `time` falls.
pub fn seek_position(time: f32, duration: Option<f32>) -> f32 {
    match duration {
        Some(duration) if duration > 0.0 => time % duration,
        _ => time,
    }
}

fn spawn_decoder(job: DecodeJob) -> Result<(Receiver<DecodedFrame>, Arc<AtomicBool>, JoinHandle<()>)> {
    let (frame_tx, frame_rx) = mpsc::sync_channel(CHANNEL_DEPTH);
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = stop.clone();
    let thread = thread::Builder::new()
        .name("video-decode".to_string())
        .spawn(move || decode_loop(job, frame_tx, thread_stop))?;
    Ok((frame_rx, stop, thread))
}

fn decode_loop(job: DecodeJob, tx: SyncSender<DecodedFrame>, stop: Arc<AtomicBool>) {
    let ProbeInfo { width, height, fps, .. } = job.info;
    let frame_size = frame_size(width, height);
    let frame_duration = 1.0 / fps;
    let mut emitted = 0u64;
    let mut position = job.start_position;
    let mut loops_without_frames = 0;

    while !stop.load(Ordering::Relaxed) {
        info!("Starting ffmpeg process at {:.2}s", position);
        let mut child = match spawn_ffmpeg(&job.path, position) {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn ffmpeg: {}", e);
                return;
            }
        };
        let Some(mut stdout) = child.stdout.take() else {
            error!("ffmpeg stdout is not piped");
            let _ = child.kill();
            return;
        };

        let mut buffer = vec![0u8; frame_size];
        let started_at = emitted;
        loop {
            if stop.load(Ordering::Relaxed) {
                let _ = child.kill();
                return;
            }

            if let Err(e) = stdout.read_exact(&mut buffer) {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    warn!("Error reading from ffmpeg: {}", e);
                }
                break;
            }

            let mut frame = VideoFrame::from_data(width, height, PixelFormat::Rgba, buffer.clone());
            let timestamp = job.first_timestamp + emitted as f32 * frame_duration;
            frame.timestamp = Some(timestamp);
            let decoded = DecodedFrame {
                frame,
                sequence: job.sequence.fetch_add(1, Ordering::Relaxed),
                timestamp,
            };
            emitted += 1;

            // Blocks while the channel is full; fails once the decoder is dropped.
            if tx.send(decoded).is_err() {
                let _ = child.kill();
                return;
            }
        }

        let _ = child.wait();
        if emitted == started_at {
            loops_without_frames += 1;
            if loops_without_frames >= 3 {
                error!("ffmpeg produced no frames for {:?}, giving up", job.path);
                return;
            }
            thread::sleep(Duration::from_millis(500));
        } else {
            loops_without_frames = 0;
            info!("Video loop restarting");
        }
        position = 0.0;
    }
}

/// Bytes in one RGBA frame.
fn frame_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * PixelFormat::Rgba.bytes_per_pixel()
}

fn spawn_ffmpeg(path: &Path, position: f32) -> Result<Child> {
    let mut command = Command::new("ffmpeg");
    command.args(["-v", "error"]);
    if position > 0.0 {
        command.args(["-ss", &format!("{:.3}", position)]);
    }
    let mut child = command
        .arg("-i")
        .arg(path)
        .args(["-f", "image2pipe", "-pix_fmt", "rgba", "-vcodec", "rawvideo", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stderr) = child.stderr.take() {
        thread::spawn(move || {
            let mut log = String::new();
            if stderr.read_to_string(&mut log).is_ok() {
                for line in log.lines().filter(|l| !l.trim().is_empty()) {
                    error!("ffmpeg: {}", line);
                }
            }
        });
    }
    Ok(child)
}

/// Parses `width,height,r_frame_rate[,duration]` as printed by ffprobe's
/// csv writer.
pub fn parse_probe(output: &str) -> Result<ProbeInfo> {
    let line = output
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| anyhow!("ffprobe found no video stream"))?;
    let parts: Vec<&str> = line.trim().split(',').collect();
    if parts.len() < 2 {
        return Err(anyhow!("Invalid ffprobe output: {}", line));
    }

    let width: u32 = parts[0].parse()?;
    let height: u32 = parts[1].parse()?;
    let fps = parts.get(2).map(|p| parse_fps(p)).unwrap_or(30.0);
    // `N/A` for containers without a stream duration.
    let duration = parts
        .get(3)
        .and_then(|d| d.trim().parse::<f32>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);
    Ok(ProbeInfo {
        width,
        height,
        fps,
        duration,
    })
}

/// Parses a frame rate like `30000/1001` or `25`. Falls back to 30.
pub fn parse_fps(s: &str) -> f32 {
    let fps = match s.trim().split_once('/') {
        Some((num, den)) => {
            let n: f32 = num.parse().unwrap_or(0.0);
            let d: f32 = den.parse().unwrap_or(0.0);
            if d == 0.0 {
                0.0
            } else {
                n / d
            }
        }
        None => s.trim().parse().unwrap_or(0.0),
    };
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        30.0
    }
}
