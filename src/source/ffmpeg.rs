//! ffmpeg-backed frame source
//!
//! Runs one `ffmpeg` child per connection, reading the camera over RTSP and
//! writing an MJPEG image pipe to stdout. Frames are cut out of the pipe with
//! [`JpegSplitter`] and decoded with `image`.

use std::path::PathBuf;
use std::process::Stdio;

use bytes::Bytes;
use image::RgbImage;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::error::{ConnectionError, ReadError};
use crate::media::{decode_jpeg, Frame, JpegSplitter};
use crate::settings::SourceConfig;

use super::address::redact_address;
use super::{FrameSource, SourceFactory, SourceKey};

/// Options for the ffmpeg child process
#[derive(Debug, Clone)]
pub struct FfmpegOptions {
    /// ffmpeg executable
    pub binary: PathBuf,

    /// RTSP lower transport ("tcp" or "udp")
    pub rtsp_transport: String,

    /// MJPEG quality of the pipe (`-q:v`, 2 = best, 31 = worst)
    pub pipe_quality: u8,

    /// Bytes to reserve per read from the pipe
    pub read_chunk: usize,

    /// Largest frame accepted from the pipe
    pub max_frame_size: usize,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            rtsp_transport: "tcp".to_string(),
            pipe_quality: 3,
            read_chunk: 64 * 1024,
            max_frame_size: crate::media::jpeg::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl FfmpegOptions {
    /// Set the ffmpeg executable
    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the RTSP lower transport
    pub fn rtsp_transport(mut self, transport: impl Into<String>) -> Self {
        self.rtsp_transport = transport.into();
        self
    }
}

/// One ffmpeg process reading one upstream address
pub struct FfmpegSource {
    address: String,
    redacted: String,
    options: FfmpegOptions,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    splitter: JpegSplitter,
    /// First frame, decoded during connect
    pending: Option<Frame>,
}

impl FfmpegSource {
    /// Create an unconnected source
    pub fn new(address: impl Into<String>, options: FfmpegOptions) -> Self {
        let address = address.into();
        let redacted = redact_address(&address);
        let splitter = JpegSplitter::with_max_frame_size(options.max_frame_size);

        Self {
            address,
            redacted,
            options,
            child: None,
            stdout: None,
            splitter,
            pending: None,
        }
    }

    /// Address with credentials removed
    pub fn redacted_address(&self) -> &str {
        &self.redacted
    }

    /// Whether a child process is currently attached
    pub fn is_open(&self) -> bool {
        self.child.is_some()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.options.binary);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-fflags", "nobuffer", "-flags", "low_delay"]);

        if self.address.starts_with("rtsp") {
            cmd.args(["-rtsp_transport", self.options.rtsp_transport.as_str()]);
        }

        cmd.arg("-i")
            .arg(&self.address)
            .args(["-an", "-f", "image2pipe", "-c:v", "mjpeg"])
            .arg("-q:v")
            .arg(self.options.pipe_quality.to_string())
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        cmd
    }

    async fn next_jpeg(&mut self) -> Result<Bytes, ReadError> {
        let stdout = self.stdout.as_mut().ok_or(ReadError::NotConnected)?;

        loop {
            if let Some(jpeg) = self.splitter.next_frame()? {
                return Ok(jpeg);
            }

            let buf = self.splitter.buffer_mut();
            buf.reserve(self.options.read_chunk);
            let n = stdout.read_buf(buf).await?;
            if n == 0 {
                return Err(ReadError::Eof);
            }
        }
    }

    async fn next_decoded(&mut self) -> Result<Frame, ReadError> {
        let jpeg = self.next_jpeg().await?;
        let image = decode_off_runtime(jpeg).await?;
        Ok(Frame::new(image))
    }
}

impl FrameSource for FfmpegSource {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if url::Url::parse(&self.address).is_err() {
            return Err(ConnectionError::InvalidAddress(self.redacted.clone()));
        }

        self.close().await;

        let mut child = self.command().spawn().map_err(ConnectionError::Spawn)?;
        let stdout = child.stdout.take().ok_or(ConnectionError::Closed)?;
        self.child = Some(child);
        self.stdout = Some(stdout);

        tracing::debug!(address = %self.redacted, "ffmpeg started, waiting for first frame");

        match self.next_decoded().await {
            Ok(frame) => {
                self.pending = Some(frame);
                Ok(())
            }
            Err(ReadError::Eof) => {
                self.close().await;
                Err(ConnectionError::Closed)
            }
            Err(e) => {
                self.close().await;
                Err(ConnectionError::BadFirstFrame(e))
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        self.next_decoded().await
    }

    async fn close(&mut self) {
        self.stdout = None;
        self.pending = None;
        self.splitter.clear();

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(address = %self.redacted, error = %e, "ffmpeg already exited");
            }
        }
    }
}

/// Decode a JPEG on the blocking pool
async fn decode_off_runtime(jpeg: Bytes) -> Result<RgbImage, ReadError> {
    tokio::task::spawn_blocking(move || decode_jpeg(&jpeg))
        .await
        .map_err(|e| ReadError::Decode(format!("decode task failed: {}", e)))?
}

/// Creates an [`FfmpegSource`] per key, deriving the quality-specific address
#[derive(Debug, Clone, Default)]
pub struct FfmpegSourceFactory {
    options: FfmpegOptions,
}

impl FfmpegSourceFactory {
    pub fn new(options: FfmpegOptions) -> Self {
        Self { options }
    }
}

impl SourceFactory for FfmpegSourceFactory {
    type Source = FfmpegSource;

    fn create(&self, source: &SourceConfig, key: &SourceKey) -> FfmpegSource {
        let address = source.address_for(key.quality);
        FfmpegSource::new(address, self.options.clone())
    }
}
