//! Camera frame acquisition seam and JPEG encoding.
//!
//! The actual camera device API lives in the embedding shell (the same
//! way platform screenshot capture lives outside the core); the buffer
//! only sees the [`FrameSource`] trait. The device handle behind an
//! opened source is exclusively owned until `release`.

use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

use crate::config::Resolution;

#[derive(Debug, Error)]
pub enum CameraError {
    /// The device is denied, missing, or otherwise unusable. Non-fatal:
    /// the assessment continues without captures.
    #[error("camera unavailable: {0}")]
    Unavailable(String),

    /// A second acquisition was attempted while the session already
    /// holds the device.
    #[error("camera already active for session {0}")]
    AlreadyActive(String),

    /// A single frame grab failed; the next trigger simply tries again.
    #[error("frame grab failed: {0}")]
    Frame(String),
}

/// One uncompressed RGB frame as delivered by the device.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Camera device boundary implemented by the embedding shell.
pub trait FrameSource: Send {
    fn open(&mut self, resolution: Resolution) -> Result<(), CameraError>;

    fn grab(&mut self) -> Result<RawFrame, CameraError>;

    /// Must be safe to call repeatedly and on a source that never
    /// opened.
    fn release(&mut self);
}

/// Encode a raw frame to JPEG off the event loop.
pub async fn encode_jpeg(frame: RawFrame, quality: u8) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_jpeg_blocking(&frame, quality))
        .await
        .context("jpeg encode worker join failed")?
}

fn encode_jpeg_blocking(frame: &RawFrame, quality: u8) -> Result<Vec<u8>> {
    let image = image::RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())
        .ok_or_else(|| {
            anyhow!(
                "frame buffer is {} bytes, expected {}x{}x3",
                frame.rgb.len(),
                frame.width,
                frame.height
            )
        })?;

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    image
        .write_with_encoder(encoder)
        .context("jpeg encoding failed")?;

    Ok(out.into_inner())
}
