#![allow(dead_code)]

/// Registers FFmpeg components. Call once at startup before opening a
/// codec session.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod encoder;
pub mod error;
pub mod frame;
pub mod packet;
pub mod queue;
pub mod session;
