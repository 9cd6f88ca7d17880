//! Classification of the audio, video and data messages a publisher sends.
//!
//! Only the first few bytes of each FLV tag body are inspected.  That is enough to tell
//! sequence headers (which every decoder needs before anything else) apart from frames, and
//! keyframes apart from the frames that depend on them.

use bytes::Bytes;
use delay_relay_rtmp::messages::type_ids;
use delay_relay_rtmp::time::RtmpTimestamp;

const SOUND_FORMAT_AAC: u8 = 10;
const SOUND_FORMAT_EX_HEADER: u8 = 9;
const AAC_SEQUENCE_HEADER: u8 = 0;
const AUDIO_PACKET_SEQUENCE_START: u8 = 0;

const VIDEO_EX_HEADER_BIT: u8 = 0x80;
const FRAME_TYPE_KEY: u8 = 1;
const CODEC_ID_AVC: u8 = 7;
const CODEC_ID_HEVC: u8 = 12;
const AVC_SEQUENCE_HEADER: u8 = 0;

const PACKET_TYPE_SEQUENCE_START: u8 = 0;
const PACKET_TYPE_CODED_FRAMES: u8 = 1;
const PACKET_TYPE_CODED_FRAMES_X: u8 = 3;
const PACKET_TYPE_METADATA: u8 = 4;
const PACKET_TYPE_MPEG2TS_SEQUENCE_START: u8 = 5;

const KNOWN_FOURCCS: [&[u8; 4]; 4] = [b"av01", b"vp09", b"hvc1", b"avc1"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
    Data,
}

impl MediaKind {
    pub fn from_type_id(type_id: u8) -> Option<MediaKind> {
        match type_id {
            type_ids::AUDIO => Some(MediaKind::Audio),
            type_ids::VIDEO => Some(MediaKind::Video),
            type_ids::AMF0_DATA => Some(MediaKind::Data),
            _ => None,
        }
    }

    pub fn type_id(self) -> u8 {
        match self {
            MediaKind::Audio => type_ids::AUDIO,
            MediaKind::Video => type_ids::VIDEO,
            MediaKind::Data => type_ids::AMF0_DATA,
        }
    }
}

/// What a single media message carries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaFlag {
    AudioHeader,
    AudioFrame,
    VideoHeader,
    KeyFrame,
    VideoFrame,
    Metadata,
    HdrMetadata,
    Mpeg2Ts,
    Invalid,
}

impl MediaFlag {
    /// Messages a player must receive before it can decode anything that follows
    pub fn is_stream_header(self) -> bool {
        matches!(self, MediaFlag::AudioHeader | MediaFlag::VideoHeader | MediaFlag::Metadata)
    }
}

/// One audio, video or data message received from the publisher
#[derive(Clone, Debug, PartialEq)]
pub struct MediaMessage {
    pub kind: MediaKind,
    pub timestamp: RtmpTimestamp,
    pub data: Bytes,
}

impl MediaMessage {
    pub fn new(kind: MediaKind, timestamp: RtmpTimestamp, data: Bytes) -> MediaMessage {
        MediaMessage {
            kind,
            timestamp,
            data,
        }
    }

    pub fn flag(&self) -> MediaFlag {
        classify(self.kind, &self.data)
    }
}

pub fn classify(kind: MediaKind, payload: &[u8]) -> MediaFlag {
    match kind {
        MediaKind::Audio => classify_audio(payload),
        MediaKind::Video => classify_video(payload),
        MediaKind::Data => MediaFlag::Metadata,
    }
}

fn classify_audio(payload: &[u8]) -> MediaFlag {
    let first = match payload.first() {
        Some(x) => *x,
        None => return MediaFlag::Invalid,
    };

    match first >> 4 {
        SOUND_FORMAT_AAC if payload.get(1) == Some(&AAC_SEQUENCE_HEADER) => MediaFlag::AudioHeader,
        SOUND_FORMAT_EX_HEADER if first & 0x0f == AUDIO_PACKET_SEQUENCE_START => MediaFlag::AudioHeader,
        _ => MediaFlag::AudioFrame,
    }
}

fn classify_video(payload: &[u8]) -> MediaFlag {
    let first = match payload.first() {
        Some(x) => *x,
        None => return MediaFlag::Invalid,
    };

    let frame_type = (first >> 4) & 0b0111;
    if first & VIDEO_EX_HEADER_BIT == 0 {
        let codec_id = first & 0x0f;
        let is_avc_like = codec_id == CODEC_ID_AVC || codec_id == CODEC_ID_HEVC;

        return match payload.get(1) {
            Some(&AVC_SEQUENCE_HEADER) if is_avc_like => MediaFlag::VideoHeader,
            _ if frame_type == FRAME_TYPE_KEY => MediaFlag::KeyFrame,
            _ => MediaFlag::VideoFrame,
        };
    }

    // Enhanced RTMP: the low nibble is the packet type and a fourCC follows
    let four_cc = match payload.get(1..5) {
        Some(x) => x,
        None => return MediaFlag::Invalid,
    };

    if !KNOWN_FOURCCS.iter().any(|known| &known[..] == four_cc) {
        return MediaFlag::Invalid;
    }

    match first & 0x0f {
        PACKET_TYPE_SEQUENCE_START => MediaFlag::VideoHeader,
        PACKET_TYPE_CODED_FRAMES | PACKET_TYPE_CODED_FRAMES_X if frame_type == FRAME_TYPE_KEY => {
            MediaFlag::KeyFrame
        }
        PACKET_TYPE_CODED_FRAMES | PACKET_TYPE_CODED_FRAMES_X => MediaFlag::VideoFrame,
        PACKET_TYPE_METADATA => MediaFlag::HdrMetadata,
        PACKET_TYPE_MPEG2TS_SEQUENCE_START => MediaFlag::Mpeg2Ts,
        _ => MediaFlag::Invalid,
    }
}
