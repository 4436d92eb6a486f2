use std::fmt::{Display, Formatter};

use bytes::Bytes;
use ffmpeg_next::{ChannelLayout, format::Sample};

pub type FrameSender = crate::queue::HandoffSender<AudioFrame>;
pub type FrameReceiver = crate::queue::HandoffReceiver<AudioFrame>;

/// One unit of decoded audio handed to the encode stage. Ownership moves
/// into the frame queue on enqueue and to the worker on dequeue.
#[derive(Clone)]
pub struct AudioFrame {
    pts: i64,
    duration: i64,
    // one buffer per plane; packed formats carry a single interleaved plane
    planes: Vec<Bytes>,
    format: Sample,
    sample_rate: u32,
    channel_layout: ChannelLayout,
    channels: u16,
}

impl AudioFrame {
    pub fn new(
        pts: i64,
        duration: i64,
        planes: Vec<Bytes>,
        format: Sample,
        sample_rate: u32,
        channel_layout: ChannelLayout,
        channels: u16,
    ) -> Self {
        Self {
            pts,
            duration,
            planes,
            format,
            sample_rate,
            channel_layout,
            channels,
        }
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn planes(&self) -> &[Bytes] {
        &self.planes
    }

    pub fn format(&self) -> Sample {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        self.channel_layout
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Per-channel sample count derived from the first plane.
    pub fn samples(&self) -> usize {
        let Some(plane) = self.planes.first() else {
            return 0;
        };
        let bytes_per_sample = self.format.bytes();
        if bytes_per_sample == 0 {
            return 0;
        }
        let per_sample = if self.format.is_planar() {
            bytes_per_sample
        } else {
            bytes_per_sample * self.channels.max(1) as usize
        };
        plane.len() / per_sample
    }
}

impl Display for AudioFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "AudioFrame pts: {}, duration: {}, samples: {}, planes: {}, rate: {}",
            self.pts,
            self.duration,
            self.samples(),
            self.planes.len(),
            self.sample_rate
        )
    }
}
