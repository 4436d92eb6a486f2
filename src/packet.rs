use std::fmt::{Display, Formatter};

use bytes::Bytes;
use ffmpeg_next::media;

pub type PacketSender = crate::queue::HandoffSender<EncodedPacket>;
pub type PacketReceiver = crate::queue::HandoffReceiver<EncodedPacket>;

/// Framing of the encoded payload handed downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitstreamFormat {
    /// AAC in self-contained ADTS frames.
    AacAdts,
    Opus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    Raw,
}

/// One unit of encoder output bitstream. Ownership transfers to the
/// consumer on dequeue.
#[derive(Clone, Debug)]
pub struct EncodedPacket {
    pub track_id: usize,
    pub media_type: media::Type,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub data: Bytes,
    pub is_key: bool,
    pub bitstream: BitstreamFormat,
    pub packet_type: PacketType,
}

impl EncodedPacket {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl Display for EncodedPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "EncodedPacket track: {}, pts: {}, dts: {}, duration: {}, size: {}, bitstream: {:?}",
            self.track_id,
            self.pts,
            self.dts,
            self.duration,
            self.size(),
            self.bitstream
        )
    }
}
