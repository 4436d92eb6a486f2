use bytes::Bytes;
use ffmpeg_next::{ChannelLayout, Rational, format::Sample};
use serde::{Deserialize, Serialize};

use crate::{
    encoder::Settings,
    error::EncodeError,
    frame::AudioFrame,
    packet::{BitstreamFormat, EncodedPacket, PacketType},
};

/// Codec identities the encode stage can drive. Each variant dispatches its
/// own codec id, fed sample format and bitstream tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
}

impl AudioCodec {
    pub fn codec_id(self) -> ffmpeg_next::codec::Id {
        match self {
            AudioCodec::Aac => ffmpeg_next::codec::Id::AAC,
            AudioCodec::Opus => ffmpeg_next::codec::Id::OPUS,
        }
    }

    /// Sample format frames for this codec must carry.
    pub fn sample_format(self) -> Sample {
        match self {
            AudioCodec::Aac => Sample::F32(ffmpeg_next::format::sample::Type::Planar),
            AudioCodec::Opus => Sample::I16(ffmpeg_next::format::sample::Type::Packed),
        }
    }

    pub fn bitstream_format(self) -> BitstreamFormat {
        match self {
            AudioCodec::Aac => BitstreamFormat::AacAdts,
            AudioCodec::Opus => BitstreamFormat::Opus,
        }
    }

    /// Canonical samples-per-frame, used when the opened context does not
    /// report one.
    pub fn default_samples_per_frame(self) -> usize {
        match self {
            AudioCodec::Aac => 1024,
            AudioCodec::Opus => 960,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Opus => "opus",
        }
    }

    /// Whether the linked FFmpeg build carries an encoder for this codec.
    pub fn is_available(self) -> bool {
        ffmpeg_next::encoder::find(self.codec_id()).is_some()
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of pulling one packet out of the codec.
pub enum Drain {
    /// One encoded packet is ready.
    Packet(EncodedPacket),
    /// The codec wants another frame before it can emit more output.
    NeedMoreInput,
    /// The codec reached end of stream.
    EndOfStream,
}

/// Owns the opened codec context and mediates all interaction with it.
/// Exclusively owned and driven by the single worker thread once the
/// encoder is started.
pub struct CodecSession {
    codec: AudioCodec,
    encoder: ffmpeg_next::codec::encoder::Audio,
    samples_per_frame: usize,
    sample_format: Sample,
    sample_rate: u32,
    channel_layout: ChannelLayout,
    channels: u16,
}

impl CodecSession {
    /// Resolves the encoder implementation, allocates and opens the codec
    /// context. Any failure here is fatal to startup; no worker thread
    /// exists yet.
    pub fn open(settings: &Settings) -> Result<Self, EncodeError> {
        let codec = ffmpeg_next::encoder::find(settings.codec.codec_id())
            .ok_or(EncodeError::CodecUnavailable(settings.codec.name()))?;

        let context = ffmpeg_next::codec::Context::new_with_codec(codec);
        let mut audio = context
            .encoder()
            .audio()
            .map_err(|e| EncodeError::Configure(format!("audio encoder context: {}", e)))?;

        let sample_format = settings.codec.sample_format();
        let channel_layout = settings.channel_layout.layout();
        audio.set_bit_rate(settings.bitrate as usize);
        audio.set_format(sample_format);
        audio.set_rate(settings.sample_rate as i32);
        audio.set_channel_layout(channel_layout);
        audio.set_time_base(Rational::new(1, settings.sample_rate as i32));

        let encoder = audio
            .open_as(codec)
            .map_err(|e| EncodeError::Configure(format!("open {}: {}", settings.codec, e)))?;

        let samples_per_frame = match encoder.frame_size() as usize {
            0 => settings.codec.default_samples_per_frame(),
            n => n,
        };

        log::info!(
            "opened {} encoder: {} Hz, {} ch, {} bps, {} samples/frame",
            settings.codec,
            settings.sample_rate,
            settings.channel_layout.channels(),
            settings.bitrate,
            samples_per_frame
        );

        Ok(Self {
            codec: settings.codec,
            encoder,
            samples_per_frame,
            sample_format,
            sample_rate: settings.sample_rate,
            channel_layout,
            channels: settings.channel_layout.channels(),
        })
    }

    pub fn codec(&self) -> AudioCodec {
        self.codec
    }

    /// The per-channel sample count every submitted frame must carry.
    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    pub fn sample_format(&self) -> Sample {
        self.sample_format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        self.channel_layout
    }

    /// Copies the source samples into a fresh codec-owned frame and hands it
    /// to the codec; the source buffers are not referenced after return.
    /// Frames that do not match the negotiated plane count or sample count
    /// are rejected.
    pub fn submit_frame(&mut self, source: &AudioFrame) -> anyhow::Result<()> {
        if source.samples() != self.samples_per_frame {
            anyhow::bail!(
                "frame carries {} samples, encoder expects {}",
                source.samples(),
                self.samples_per_frame
            );
        }

        let mut frame = ffmpeg_next::frame::Audio::new(
            self.sample_format,
            self.samples_per_frame,
            self.channel_layout,
        );
        if source.planes().len() != frame.planes() {
            anyhow::bail!(
                "frame carries {} planes, encoder expects {}",
                source.planes().len(),
                frame.planes()
            );
        }
        frame.set_rate(self.sample_rate);
        frame.set_pts(Some(source.pts()));
        unsafe {
            (*frame.as_mut_ptr()).duration = source.duration();
        }
        for (plane, data) in source.planes().iter().enumerate() {
            let dst = frame.data_mut(plane);
            let len = dst.len().min(data.len());
            dst[..len].copy_from_slice(&data[..len]);
        }

        self.encoder.send_frame(&frame)?;
        Ok(())
    }

    /// Pulls zero or one ready packet out of the codec.
    pub fn drain_packet(&mut self) -> anyhow::Result<Drain> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Drain::Packet(self.tag_packet(&packet))),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(Drain::NeedMoreInput)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(Drain::EndOfStream),
            Err(err) => Err(err.into()),
        }
    }

    fn tag_packet(&self, packet: &ffmpeg_next::codec::packet::Packet) -> EncodedPacket {
        let nopts = ffmpeg_next::ffi::AV_NOPTS_VALUE as i64;
        EncodedPacket {
            track_id: 0,
            media_type: ffmpeg_next::media::Type::Audio,
            pts: packet.pts().unwrap_or(nopts),
            dts: packet.dts().unwrap_or(nopts),
            duration: packet.duration(),
            data: packet.data().map(Bytes::copy_from_slice).unwrap_or_default(),
            is_key: true,
            bitstream: self.codec.bitstream_format(),
            packet_type: PacketType::Raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{ChannelConfig, Settings};

    fn aac_settings() -> Settings {
        Settings {
            codec: AudioCodec::Aac,
            bitrate: 128_000,
            sample_rate: 48_000,
            channel_layout: ChannelConfig::Stereo,
        }
    }

    fn silence_frame(settings: &Settings, samples: usize, pts: i64) -> AudioFrame {
        let format = settings.codec.sample_format();
        let channels = settings.channel_layout.channels() as usize;
        let (plane_count, plane_len) = if format.is_planar() {
            (channels, samples * format.bytes())
        } else {
            (1, samples * format.bytes() * channels)
        };
        let planes = (0..plane_count)
            .map(|_| Bytes::from(vec![0u8; plane_len]))
            .collect();
        AudioFrame::new(
            pts,
            samples as i64,
            planes,
            format,
            settings.sample_rate,
            settings.channel_layout.layout(),
            settings.channel_layout.channels(),
        )
    }

    #[test]
    fn test_codec_dispatch_tags() {
        assert_eq!(AudioCodec::Aac.bitstream_format(), BitstreamFormat::AacAdts);
        assert_eq!(AudioCodec::Opus.bitstream_format(), BitstreamFormat::Opus);
        assert_eq!(AudioCodec::Aac.default_samples_per_frame(), 1024);
        assert_eq!(AudioCodec::Aac.name(), "aac");
        assert_eq!(AudioCodec::Aac.codec_id(), ffmpeg_next::codec::Id::AAC);
    }

    #[test]
    fn test_codec_from_json() -> anyhow::Result<()> {
        let codec: AudioCodec = serde_json::from_str("\"opus\"")?;
        assert_eq!(codec, AudioCodec::Opus);
        Ok(())
    }

    #[test]
    fn test_open_reports_samples_per_frame() -> anyhow::Result<()> {
        crate::init()?;
        if !AudioCodec::Aac.is_available() {
            eprintln!("skip: no AAC encoder in this FFmpeg build");
            return Ok(());
        }
        let session = CodecSession::open(&aac_settings())?;
        assert_eq!(session.samples_per_frame(), 1024);
        assert_eq!(session.codec(), AudioCodec::Aac);
        Ok(())
    }

    #[test]
    fn test_submit_rejects_wrong_sample_count() -> anyhow::Result<()> {
        crate::init()?;
        if !AudioCodec::Aac.is_available() {
            eprintln!("skip: no AAC encoder in this FFmpeg build");
            return Ok(());
        }
        let settings = aac_settings();
        let mut session = CodecSession::open(&settings)?;
        let undersized = silence_frame(&settings, 512, 0);
        assert!(session.submit_frame(&undersized).is_err());
        Ok(())
    }

    #[test]
    fn test_submit_then_drain_cycle() -> anyhow::Result<()> {
        crate::init()?;
        if !AudioCodec::Aac.is_available() {
            eprintln!("skip: no AAC encoder in this FFmpeg build");
            return Ok(());
        }
        let settings = aac_settings();
        let mut session = CodecSession::open(&settings)?;
        let samples = session.samples_per_frame();
        for i in 0..3i64 {
            session.submit_frame(&silence_frame(&settings, samples, i * samples as i64))?;
            loop {
                match session.drain_packet()? {
                    Drain::Packet(packet) => {
                        assert!(packet.size() > 0);
                        assert_eq!(packet.bitstream, BitstreamFormat::AacAdts);
                        assert_eq!(packet.packet_type, PacketType::Raw);
                    }
                    Drain::NeedMoreInput => break,
                    Drain::EndOfStream => break,
                }
            }
        }
        Ok(())
    }
}
