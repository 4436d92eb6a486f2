use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    error::EncodeError,
    frame::{AudioFrame, FrameReceiver, FrameSender},
    packet::{EncodedPacket, PacketReceiver, PacketSender},
    queue,
    session::{AudioCodec, CodecSession, Drain},
};

/// Output channel layout the stage is configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelConfig {
    Mono,
    Stereo,
}

impl ChannelConfig {
    pub fn layout(self) -> ffmpeg_next::ChannelLayout {
        match self {
            ChannelConfig::Mono => ffmpeg_next::ChannelLayout::MONO,
            ChannelConfig::Stereo => ffmpeg_next::ChannelLayout::STEREO,
        }
    }

    pub fn channels(self) -> u16 {
        match self {
            ChannelConfig::Mono => 1,
            ChannelConfig::Stereo => 2,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig::Stereo
    }
}

/// Recognized encode options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "Settings::default_codec")]
    pub codec: AudioCodec,
    /// Target bit rate in bps.
    #[serde(default = "Settings::default_bitrate")]
    pub bitrate: u64,
    /// Output sample rate in Hz.
    #[serde(default = "Settings::default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub channel_layout: ChannelConfig,
}

impl Settings {
    fn default_codec() -> AudioCodec {
        AudioCodec::Aac
    }

    fn default_bitrate() -> u64 {
        128_000
    }

    fn default_sample_rate() -> u32 {
        48_000
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            codec: AudioCodec::Aac,
            bitrate: 128_000,
            sample_rate: 48_000,
            channel_layout: ChannelConfig::Stereo,
        }
    }
}

/// Lifecycle of the encode stage. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderState {
    Created,
    Configured,
    Running,
    Stopping,
    Stopped,
}

/// Single-track audio encode stage: decoded frames go in through a blocking
/// queue, one worker thread drives the codec session, encoded packets come
/// out of a poll-based queue.
pub struct AudioEncoder {
    settings: Settings,
    state: EncoderState,
    cancel: CancellationToken,
    session: Option<CodecSession>,
    samples_per_frame: usize,
    frame_tx: FrameSender,
    frame_rx: Option<FrameReceiver>,
    packet_tx: Option<PacketSender>,
    packet_rx: PacketReceiver,
    worker: Option<JoinHandle<()>>,
}

impl AudioEncoder {
    pub fn new(settings: Settings) -> Self {
        let cancel = CancellationToken::new();
        let (frame_tx, frame_rx) = queue::handoff(cancel.clone());
        let (packet_tx, packet_rx) = queue::handoff(cancel.clone());
        Self {
            settings,
            state: EncoderState::Created,
            cancel,
            session: None,
            samples_per_frame: 0,
            frame_tx,
            frame_rx: Some(frame_rx),
            packet_tx: Some(packet_tx),
            packet_rx,
            worker: None,
        }
    }

    /// Opens the codec session and reports the per-channel sample count
    /// every subsequent frame must carry. Must succeed before `start`.
    pub fn configure(&mut self) -> Result<usize, EncodeError> {
        if self.state != EncoderState::Created {
            return Err(EncodeError::AlreadyConfigured);
        }
        let session = CodecSession::open(&self.settings)?;
        self.samples_per_frame = session.samples_per_frame();
        self.session = Some(session);
        self.state = EncoderState::Configured;
        Ok(self.samples_per_frame)
    }

    /// Spawns the single worker thread.
    ///
    /// # Panics
    ///
    /// Panics when called without a prior successful `configure`.
    pub fn start(&mut self) -> Result<(), EncodeError> {
        assert_eq!(
            self.state,
            EncoderState::Configured,
            "start requires a configured encoder"
        );
        let session = self
            .session
            .take()
            .expect("configured encoder holds a session");
        let frames = self
            .frame_rx
            .take()
            .expect("configured encoder holds the frame receiver");
        let packets = self
            .packet_tx
            .take()
            .expect("configured encoder holds the packet sender");

        let spawned = std::thread::Builder::new()
            .name(format!("enc-{}", self.settings.codec))
            .spawn(move || encode_loop(session, frames, packets));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.state = EncoderState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = EncoderState::Stopped;
                Err(EncodeError::Startup(e))
            }
        }
    }

    /// Hands one decoded frame to the stage. Never blocks. Returns false
    /// once the stage is stopped; the frame is dropped.
    pub fn send_frame(&self, frame: AudioFrame) -> bool {
        self.frame_tx.enqueue(frame)
    }

    /// Non-blocking poll for the next encoded packet. `None` means no data
    /// is ready.
    pub fn try_receive(&mut self) -> Option<EncodedPacket> {
        self.packet_rx.try_dequeue()
    }

    /// Stops both queues, signals the worker and joins it. Safe to call
    /// multiple times; the join happens exactly once.
    pub fn stop(&mut self) {
        if self.state == EncoderState::Running {
            self.state = EncoderState::Stopping;
        }
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("audio encode worker panicked");
            }
        }
        self.state = EncoderState::Stopped;
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Per-channel sample count negotiated by `configure`; zero before.
    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl Drop for AudioEncoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop: one frame in flight at a time, drained to exhaustion before
/// the next submit so packet order follows frame order. Exits when the frame
/// queue reports stopped and drained.
fn encode_loop(mut session: CodecSession, mut frames: FrameReceiver, packets: PacketSender) {
    log::info!("audio encode loop started ({})", session.codec());

    loop {
        let Some(source) = frames.dequeue() else {
            break;
        };

        if let Err(e) = session.submit_frame(&source) {
            log::error!("submit frame error: {}", e);
            continue;
        }

        loop {
            match session.drain_packet() {
                Ok(Drain::Packet(packet)) => {
                    // encoder priming output arrives with negative pts, skip it
                    if packet.pts < 0 {
                        continue;
                    }
                    if !packets.enqueue(packet) {
                        break;
                    }
                }
                Ok(Drain::NeedMoreInput) => break,
                Ok(Drain::EndOfStream) => {
                    log::warn!("encoder signalled end of stream");
                    break;
                }
                Err(e) => {
                    log::error!("drain packet error: {}", e);
                    break;
                }
            }
        }
    }

    log::info!("audio encode loop finished ({})", session.codec());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.codec, AudioCodec::Aac);
        assert_eq!(settings.bitrate, 128_000);
        assert_eq!(settings.sample_rate, 48_000);
        assert_eq!(settings.channel_layout, ChannelConfig::Stereo);
    }

    #[test]
    fn test_settings_from_json_with_defaults() -> anyhow::Result<()> {
        let settings: Settings = serde_json::from_str(r#"{"codec":"aac","bitrate":96000}"#)?;
        assert_eq!(settings.codec, AudioCodec::Aac);
        assert_eq!(settings.bitrate, 96_000);
        assert_eq!(settings.sample_rate, 48_000);
        assert_eq!(settings.channel_layout, ChannelConfig::Stereo);
        Ok(())
    }

    #[test]
    fn test_channel_config_channels() {
        assert_eq!(ChannelConfig::Mono.channels(), 1);
        assert_eq!(ChannelConfig::Stereo.channels(), 2);
    }
}

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;
