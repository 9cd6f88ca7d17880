use super::chunk_header::{ChunkHeader, ChunkHeaderFormat};
use super::{ChunkDeserializationError, INITIAL_MAX_CHUNK_SIZE, MAX_CHUNK_SIZE, MAX_INITIAL_TIMESTAMP};
use crate::messages::MessagePayload;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::BytesMut;
use std::cmp::min;
use std::collections::HashMap;
use std::mem;

/// Most bytes reserved ahead of a partially received message.  Declared lengths come from the
/// peer, so the buffer otherwise grows only with bytes that actually arrived.
const MAX_PAYLOAD_RESERVE: usize = 64 * 1024;

/// Reassembles RTMP chunks into message payloads.
///
/// Chunk streams interleave on the wire, so a partial message is kept per chunk stream id and
/// every byte received on a connection must go through the same deserializer.
pub struct ChunkDeserializer {
    max_chunk_size: usize,
    current_stage: ParseStage,
    current_format: ChunkHeaderFormat,
    current_csid: u32,
    pending_timestamp_field: u32,
    buffer: BytesMut,
    channels: HashMap<u32, ChannelState>,
}

struct ChannelState {
    header: ChunkHeader,
    packet: PacketBuilder,
}

/// The message being assembled on one chunk stream
struct PacketBuilder {
    data: BytesMut,
    bytes_received_so_far: usize,
}

enum ParsedValue<T> {
    NotEnoughBytes,
    Value { val: T, next_index: usize },
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum ParseStage {
    Init,
    BasicHeader,
    MessageHeader,
    ExtendedTimestamp,
    Payload,
}

#[derive(Eq, PartialEq, Debug)]
enum ParseStageResult {
    Success,
    NotEnoughBytes,
}

impl ChunkDeserializer {
    /// Creates a deserializer expecting the initial chunk size of 128 bytes
    pub fn new() -> ChunkDeserializer {
        ChunkDeserializer {
            max_chunk_size: INITIAL_MAX_CHUNK_SIZE,
            current_stage: ParseStage::Init,
            current_format: ChunkHeaderFormat::Full,
            current_csid: 0,
            pending_timestamp_field: 0,
            buffer: BytesMut::with_capacity(4096),
            channels: HashMap::new(),
        }
    }

    /// Adds the bytes to the internal buffer and returns the next complete message, if any.
    ///
    /// Only one message is returned per call.  Callers loop, passing an empty slice, until
    /// `None` comes back.  A `SetChunkSize` message must be applied through
    /// `set_max_chunk_size()` before the next call, otherwise later chunks will be misread.
    ///
    /// ```
    /// use bytes::Bytes;
    /// use delay_relay_rtmp::time::RtmpTimestamp;
    /// use delay_relay_rtmp::chunk_io::{ChunkSerializer, ChunkDeserializer};
    /// use delay_relay_rtmp::messages::MessagePayload;
    ///
    /// let input1 = MessagePayload {
    ///     timestamp: RtmpTimestamp::new(55),
    ///     message_stream_id: 1,
    ///     type_id: 9,
    ///     data: Bytes::from(vec![1, 2, 3, 4, 5, 6]),
    /// };
    ///
    /// let input2 = MessagePayload {
    ///     timestamp: RtmpTimestamp::new(65),
    ///     message_stream_id: 1,
    ///     type_id: 9,
    ///     data: Bytes::from(vec![8, 9, 10]),
    /// };
    ///
    /// let mut serializer = ChunkSerializer::new();
    /// let mut all_bytes = serializer.serialize(&input1, false).unwrap().bytes;
    /// all_bytes.extend(serializer.serialize(&input2, false).unwrap().bytes);
    ///
    /// let mut deserializer = ChunkDeserializer::new();
    /// assert_eq!(deserializer.get_next_message(&all_bytes).unwrap(), Some(input1));
    /// assert_eq!(deserializer.get_next_message(&[]).unwrap(), Some(input2));
    /// assert_eq!(deserializer.get_next_message(&[]).unwrap(), None);
    /// ```
    pub fn get_next_message(
        &mut self,
        bytes: &[u8],
    ) -> Result<Option<MessagePayload>, ChunkDeserializationError> {
        self.buffer.extend_from_slice(bytes);

        loop {
            let mut complete_message = None;
            let result = match self.current_stage {
                ParseStage::Init => self.read_format(),
                ParseStage::BasicHeader => self.read_basic_header()?,
                ParseStage::MessageHeader => self.read_message_header()?,
                ParseStage::ExtendedTimestamp => self.read_extended_timestamp(),
                ParseStage::Payload => self.read_payload(&mut complete_message)?,
            };

            if result == ParseStageResult::NotEnoughBytes || complete_message.is_some() {
                return Ok(complete_message);
            }
        }
    }

    /// Changes the size of the chunks the peer is sending.  Normally called in response to a
    /// `SetChunkSize` message.
    pub fn set_max_chunk_size(&mut self, new_size: usize) -> Result<(), ChunkDeserializationError> {
        if new_size == 0 || new_size > MAX_CHUNK_SIZE as usize {
            return Err(ChunkDeserializationError::InvalidMaxChunkSize {
                chunk_size: new_size,
            });
        }

        self.max_chunk_size = new_size;
        Ok(())
    }

    pub fn get_max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    fn read_format(&mut self) -> ParseStageResult {
        if self.buffer.is_empty() {
            return ParseStageResult::NotEnoughBytes;
        }

        self.current_format = ChunkHeaderFormat::from_first_byte(self.buffer[0]);
        self.current_stage = ParseStage::BasicHeader;
        ParseStageResult::Success
    }

    fn read_basic_header(&mut self) -> Result<ParseStageResult, ChunkDeserializationError> {
        let (csid, next_index) = match get_csid(&self.buffer[..]) {
            ParsedValue::NotEnoughBytes => return Ok(ParseStageResult::NotEnoughBytes),
            ParsedValue::Value { val, next_index } => (val, next_index),
        };

        if !self.channels.contains_key(&csid) {
            if self.current_format != ChunkHeaderFormat::Full {
                return Err(ChunkDeserializationError::NoPreviousChunkOnStream { csid });
            }

            self.channels.insert(
                csid,
                ChannelState {
                    header: ChunkHeader::new(csid),
                    packet: PacketBuilder {
                        data: BytesMut::new(),
                        bytes_received_so_far: 0,
                    },
                },
            );
        }

        let _ = self.buffer.split_to(next_index);
        self.current_csid = csid;
        self.current_stage = ParseStage::MessageHeader;
        Ok(ParseStageResult::Success)
    }

    fn read_message_header(&mut self) -> Result<ParseStageResult, ChunkDeserializationError> {
        let size = self.current_format.message_header_size();
        if self.buffer.len() < size {
            return Ok(ParseStageResult::NotEnoughBytes);
        }

        let format = self.current_format;
        let csid = self.current_csid;

        // Only a format 3 chunk may continue a message that is still being assembled
        {
            let channel = self.current_channel();
            let received = channel.packet.bytes_received_so_far;
            if received > 0 && format != ChunkHeaderFormat::Empty {
                return Err(ChunkDeserializationError::MessageLengthMismatch {
                    csid,
                    declared: channel.header.message_length,
                    received,
                });
            }
        }

        let bytes = self.buffer.split_to(size);
        if format != ChunkHeaderFormat::Empty {
            self.pending_timestamp_field = BigEndian::read_u24(&bytes[0..3]);
        }

        let channel = self.current_channel();
        match format {
            ChunkHeaderFormat::Full => {
                channel.header.message_length = BigEndian::read_u24(&bytes[3..6]);
                channel.header.message_type_id = bytes[6];
                channel.header.message_stream_id = LittleEndian::read_u32(&bytes[7..11]);
            }

            ChunkHeaderFormat::TimeDeltaWithoutMessageStreamId => {
                channel.header.message_length = BigEndian::read_u24(&bytes[3..6]);
                channel.header.message_type_id = bytes[6];
            }

            ChunkHeaderFormat::TimeDeltaOnly | ChunkHeaderFormat::Empty => (),
        }

        self.current_stage = ParseStage::ExtendedTimestamp;
        Ok(ParseStageResult::Success)
    }

    fn read_extended_timestamp(&mut self) -> ParseStageResult {
        let format = self.current_format;
        let needs_extended = match format {
            ChunkHeaderFormat::Empty => self.current_channel_ref().header.extended_timestamp,
            _ => self.pending_timestamp_field == MAX_INITIAL_TIMESTAMP,
        };

        let mut field = self.pending_timestamp_field;
        if needs_extended {
            if self.buffer.len() < 4 {
                return ParseStageResult::NotEnoughBytes;
            }

            let bytes = self.buffer.split_to(4);
            field = BigEndian::read_u32(&bytes[..]);
        }

        let channel = self.current_channel();
        let starting_new_message = channel.packet.bytes_received_so_far == 0;
        let header = &mut channel.header;
        match format {
            ChunkHeaderFormat::Full => {
                header.timestamp.set(field);
                header.timestamp_field = field;
                header.extended_timestamp = needs_extended;
            }

            ChunkHeaderFormat::TimeDeltaWithoutMessageStreamId
            | ChunkHeaderFormat::TimeDeltaOnly => {
                header.timestamp = header.timestamp + field;
                header.timestamp_field = field;
                header.extended_timestamp = needs_extended;
            }

            ChunkHeaderFormat::Empty => {
                // Continuation chunks repeat the message's timestamp, only the first chunk of
                // a new message re-applies the previous field.
                if starting_new_message {
                    header.timestamp = header.timestamp + header.timestamp_field;
                }
            }
        }

        self.current_stage = ParseStage::Payload;
        ParseStageResult::Success
    }

    fn read_payload(
        &mut self,
        message_to_return: &mut Option<MessagePayload>,
    ) -> Result<ParseStageResult, ChunkDeserializationError> {
        let max_chunk_size = self.max_chunk_size;
        let csid = self.current_csid;

        let (length, received) = {
            let channel = self.current_channel_ref();
            (
                channel.header.message_length as usize,
                channel.packet.bytes_received_so_far,
            )
        };

        let to_read = min(length.saturating_sub(received), max_chunk_size);
        if self.buffer.len() < to_read {
            return Ok(ParseStageResult::NotEnoughBytes);
        }

        let bytes = self.buffer.split_to(to_read);
        self.current_stage = ParseStage::Init;

        let channel = self.current_channel();
        let remaining = length.saturating_sub(channel.packet.data.len());
        channel.packet.data.reserve(min(remaining, MAX_PAYLOAD_RESERVE));

        channel.packet.data.extend_from_slice(&bytes[..]);
        channel.packet.bytes_received_so_far += to_read;

        if channel.packet.bytes_received_so_far >= length {
            if channel.packet.data.len() != length {
                return Err(ChunkDeserializationError::MessageLengthMismatch {
                    csid,
                    declared: channel.header.message_length,
                    received: channel.packet.data.len(),
                });
            }

            let data = mem::take(&mut channel.packet.data);
            channel.packet.bytes_received_so_far = 0;
            *message_to_return = Some(MessagePayload {
                timestamp: channel.header.timestamp,
                type_id: channel.header.message_type_id,
                message_stream_id: channel.header.message_stream_id,
                data: data.freeze(),
            });
        }

        Ok(ParseStageResult::Success)
    }

    fn current_channel(&mut self) -> &mut ChannelState {
        self.channels
            .entry(self.current_csid)
            .or_insert_with_key(|csid| ChannelState {
                header: ChunkHeader::new(*csid),
                packet: PacketBuilder {
                    data: BytesMut::new(),
                    bytes_received_so_far: 0,
                },
            })
    }

    fn current_channel_ref(&mut self) -> &ChannelState {
        self.current_channel()
    }
}

impl Default for ChunkDeserializer {
    fn default() -> Self {
        ChunkDeserializer::new()
    }
}

fn get_csid(buffer: &[u8]) -> ParsedValue<u32> {
    const CSID_MASK: u8 = 0b0011_1111;

    if buffer.is_empty() {
        return ParsedValue::NotEnoughBytes;
    }

    match buffer[0] & CSID_MASK {
        0 => {
            if buffer.len() < 2 {
                ParsedValue::NotEnoughBytes
            } else {
                ParsedValue::Value {
                    val: buffer[1] as u32 + 64,
                    next_index: 2,
                }
            }
        }

        1 => {
            if buffer.len() < 3 {
                ParsedValue::NotEnoughBytes
            } else {
                ParsedValue::Value {
                    val: (buffer[2] as u32 * 256) + buffer[1] as u32 + 64,
                    next_index: 3,
                }
            }
        }

        x => ParsedValue::Value {
            val: x as u32,
            next_index: 1,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::RtmpTimestamp;
    use byteorder::WriteBytesExt;

    #[test]
    fn can_read_type_0_chunk_with_small_chunk_stream_id() {
        let payload = [1_u8, 2, 3];
        let bytes = form_type_0_chunk(50, 25, 5, 3, &payload, &payload);

        let mut deserializer = ChunkDeserializer::new();
        let result = deserializer.get_next_message(&bytes).unwrap().unwrap();

        assert_eq!(result.type_id, 3, "Incorrect type id");
        assert_eq!(result.message_stream_id, 5, "Incorrect stream id");
        assert_eq!(result.timestamp, RtmpTimestamp::new(25), "Incorrect timestamp");
        assert_eq!(&result.data[..], &payload[..], "Incorrect data");
    }

    #[test]
    fn can_read_two_and_three_byte_chunk_stream_ids() {
        for csid in [64_u32, 300, 500, 65599] {
            let payload = [9_u8];
            let bytes = form_type_0_chunk(csid, 1, 1, 8, &payload, &payload);

            let mut deserializer = ChunkDeserializer::new();
            let result = deserializer.get_next_message(&bytes).unwrap().unwrap();
            assert_eq!(&result.data[..], &payload[..], "Incorrect data for csid {}", csid);

            // A follow up type 3 chunk on the same csid must resolve to the same stream
            let mut follow_up = basic_header(ChunkHeaderFormat::Empty, csid);
            follow_up.push(9);
            let result = deserializer.get_next_message(&follow_up).unwrap().unwrap();
            assert_eq!(result.timestamp, 2, "Delta not reapplied for csid {}", csid);
        }
    }

    #[test]
    fn can_read_type_0_chunk_with_extended_timestamp() {
        let payload = [1_u8, 2, 3];
        let bytes = form_type_0_chunk(3, 0x0100_0000, 1, 20, &payload, &payload);

        let mut deserializer = ChunkDeserializer::new();
        let result = deserializer.get_next_message(&bytes).unwrap().unwrap();

        assert_eq!(result.timestamp, RtmpTimestamp::new(0x0100_0000));
        assert_eq!(&result.data[..], &payload[..]);
    }

    #[test]
    fn type_1_and_type_2_chunks_apply_deltas() {
        let mut deserializer = ChunkDeserializer::new();
        let first = form_type_0_chunk(4, 100, 1, 8, &[1, 2], &[1, 2]);
        deserializer.get_next_message(&first).unwrap().unwrap();

        let second = form_type_1_chunk(4, 20, 9, &[3, 4, 5]);
        let result = deserializer.get_next_message(&second).unwrap().unwrap();
        assert_eq!(result.timestamp, 120);
        assert_eq!(result.type_id, 9);
        assert_eq!(result.message_stream_id, 1, "Stream id not carried over");
        assert_eq!(&result.data[..], &[3, 4, 5]);

        let third = form_type_2_chunk(4, 33, &[6, 7, 8]);
        let result = deserializer.get_next_message(&third).unwrap().unwrap();
        assert_eq!(result.timestamp, 153);
        assert_eq!(result.type_id, 9, "Type id not carried over");
        assert_eq!(&result.data[..], &[6, 7, 8]);
    }

    #[test]
    fn type_3_chunk_starting_new_message_reapplies_previous_delta() {
        let mut deserializer = ChunkDeserializer::new();
        deserializer
            .get_next_message(&form_type_0_chunk(4, 100, 1, 8, &[1], &[1]))
            .unwrap();

        deserializer
            .get_next_message(&form_type_2_chunk(4, 20, &[2]))
            .unwrap();

        let mut bytes = basic_header(ChunkHeaderFormat::Empty, 4);
        bytes.push(3);
        let result = deserializer.get_next_message(&bytes).unwrap().unwrap();
        assert_eq!(result.timestamp, 140);
        assert_eq!(&result.data[..], &[3]);
    }

    #[test]
    fn can_read_message_exceeding_maximum_chunk_size() {
        let payload: Vec<u8> = (0..300).map(|x| x as u8).collect();
        let mut bytes = form_type_0_chunk(5, 10, 1, 9, &payload, &payload[..128]);
        bytes.extend(basic_header(ChunkHeaderFormat::Empty, 5));
        bytes.extend(&payload[128..256]);
        bytes.extend(basic_header(ChunkHeaderFormat::Empty, 5));
        bytes.extend(&payload[256..]);

        let mut deserializer = ChunkDeserializer::new();
        let result = deserializer.get_next_message(&bytes).unwrap().unwrap();
        assert_eq!(result.timestamp, 10, "Continuation chunks must not add deltas");
        assert_eq!(&result.data[..], &payload[..]);
        assert_eq!(deserializer.get_next_message(&[]).unwrap(), None);
    }

    #[test]
    fn huge_declared_length_does_not_reserve_whole_message() {
        let mut bytes = basic_header(ChunkHeaderFormat::Full, 3);
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u24::<BigEndian>(0x00FF_FFFF).unwrap();
        bytes.push(9);
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.extend(&[0x17_u8; 128]);

        let mut deserializer = ChunkDeserializer::new();
        assert_eq!(deserializer.get_next_message(&bytes).unwrap(), None);

        let channel = &deserializer.channels[&3];
        assert_eq!(channel.packet.bytes_received_so_far, 128);
        assert!(
            channel.packet.data.capacity() < 1024 * 1024,
            "Reserved {} bytes for 128 received",
            channel.packet.data.capacity()
        );
    }

    #[test]
    fn interleaved_chunk_streams_are_assembled_separately() {
        let audio: Vec<u8> = vec![0xaf; 200];
        let video: Vec<u8> = vec![0x17; 150];

        let mut bytes = form_type_0_chunk(4, 10, 1, 8, &audio, &audio[..128]);
        bytes.extend(form_type_0_chunk(5, 12, 1, 9, &video, &video[..128]));
        bytes.extend(basic_header(ChunkHeaderFormat::Empty, 4));
        bytes.extend(&audio[128..]);
        bytes.extend(basic_header(ChunkHeaderFormat::Empty, 5));
        bytes.extend(&video[128..]);

        let mut deserializer = ChunkDeserializer::new();
        let first = deserializer.get_next_message(&bytes).unwrap().unwrap();
        let second = deserializer.get_next_message(&[]).unwrap().unwrap();

        assert_eq!(first.type_id, 8);
        assert_eq!(&first.data[..], &audio[..]);
        assert_eq!(second.type_id, 9);
        assert_eq!(&second.data[..], &video[..]);
    }

    #[test]
    fn can_read_message_spread_across_multiple_calls() {
        let payload = [1_u8, 2, 3, 4];
        let bytes = form_type_0_chunk(3, 25, 5, 20, &payload, &payload);

        let mut deserializer = ChunkDeserializer::new();
        for byte in &bytes[..bytes.len() - 1] {
            assert_eq!(deserializer.get_next_message(&[*byte]).unwrap(), None);
        }

        let result = deserializer
            .get_next_message(&bytes[bytes.len() - 1..])
            .unwrap()
            .unwrap();

        assert_eq!(&result.data[..], &payload[..]);
    }

    #[test]
    fn zero_length_message_is_returned() {
        let bytes = form_type_0_chunk(3, 5, 1, 20, &[], &[]);

        let mut deserializer = ChunkDeserializer::new();
        let result = deserializer.get_next_message(&bytes).unwrap().unwrap();
        assert!(result.data.is_empty());
    }

    #[test]
    fn extended_timestamp_is_repeated_on_continuation_chunks() {
        let payload: Vec<u8> = vec![1; 140];
        let mut bytes = form_type_0_chunk(5, 0x0200_0000, 1, 9, &payload, &payload[..128]);
        bytes.extend(basic_header(ChunkHeaderFormat::Empty, 5));
        bytes.write_u32::<BigEndian>(0x0200_0000).unwrap();
        bytes.extend(&payload[128..]);

        let mut deserializer = ChunkDeserializer::new();
        let result = deserializer.get_next_message(&bytes).unwrap().unwrap();
        assert_eq!(result.timestamp, 0x0200_0000);
        assert_eq!(&result.data[..], &payload[..]);
    }

    #[test]
    fn non_zero_format_without_previous_chunk_is_an_error() {
        let bytes = form_type_2_chunk(7, 10, &[1]);

        let mut deserializer = ChunkDeserializer::new();
        match deserializer.get_next_message(&bytes) {
            Err(ChunkDeserializationError::NoPreviousChunkOnStream { csid: 7 }) => (),
            x => panic!("Expected no previous chunk error, instead received {:?}", x),
        }
    }

    #[test]
    fn new_header_while_message_is_incomplete_is_an_error() {
        let payload: Vec<u8> = vec![1; 200];
        let mut bytes = form_type_0_chunk(5, 0, 1, 9, &payload, &payload[..128]);
        bytes.extend(form_type_1_chunk(5, 10, 9, &[1, 2, 3]));

        let mut deserializer = ChunkDeserializer::new();
        match deserializer.get_next_message(&bytes) {
            Err(ChunkDeserializationError::MessageLengthMismatch {
                csid: 5,
                declared: 200,
                received: 128,
            }) => (),
            x => panic!("Expected length mismatch error, instead received {:?}", x),
        }
    }

    #[test]
    fn larger_chunk_size_reads_whole_message_in_one_chunk() {
        let payload: Vec<u8> = vec![3; 4000];
        let bytes = form_type_0_chunk(5, 0, 1, 9, &payload, &payload);

        let mut deserializer = ChunkDeserializer::new();
        deserializer.set_max_chunk_size(4096).unwrap();
        let result = deserializer.get_next_message(&bytes).unwrap().unwrap();
        assert_eq!(result.data.len(), 4000);
    }

    #[test]
    fn error_when_setting_invalid_chunk_size() {
        let mut deserializer = ChunkDeserializer::new();
        assert!(deserializer.set_max_chunk_size(0x8000_0000).is_err());
        assert!(deserializer.set_max_chunk_size(0).is_err());
        assert_eq!(deserializer.get_max_chunk_size(), 128);
    }

    fn basic_header(format: ChunkHeaderFormat, csid: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        if csid < 64 {
            bytes.push(format.mask() | csid as u8);
        } else if csid < 320 {
            bytes.push(format.mask());
            bytes.push((csid - 64) as u8);
        } else {
            bytes.push(format.mask() | 1);
            bytes.write_u16::<LittleEndian>((csid - 64) as u16).unwrap();
        }

        bytes
    }

    fn form_type_0_chunk(
        csid: u32,
        timestamp: u32,
        message_stream_id: u32,
        type_id: u8,
        full_payload: &[u8],
        chunk_payload: &[u8],
    ) -> Vec<u8> {
        let mut bytes = basic_header(ChunkHeaderFormat::Full, csid);
        bytes
            .write_u24::<BigEndian>(min(timestamp, MAX_INITIAL_TIMESTAMP))
            .unwrap();
        bytes
            .write_u24::<BigEndian>(full_payload.len() as u32)
            .unwrap();
        bytes.push(type_id);
        bytes
            .write_u32::<LittleEndian>(message_stream_id)
            .unwrap();

        if timestamp >= MAX_INITIAL_TIMESTAMP {
            bytes.write_u32::<BigEndian>(timestamp).unwrap();
        }

        bytes.extend(chunk_payload);
        bytes
    }

    fn form_type_1_chunk(csid: u32, delta: u32, type_id: u8, payload: &[u8]) -> Vec<u8> {
        let mut bytes = basic_header(ChunkHeaderFormat::TimeDeltaWithoutMessageStreamId, csid);
        bytes.write_u24::<BigEndian>(delta).unwrap();
        bytes.write_u24::<BigEndian>(payload.len() as u32).unwrap();
        bytes.push(type_id);
        bytes.extend(payload);
        bytes
    }

    fn form_type_2_chunk(csid: u32, delta: u32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = basic_header(ChunkHeaderFormat::TimeDeltaOnly, csid);
        bytes.write_u24::<BigEndian>(delta).unwrap();
        bytes.extend(payload);
        bytes
    }
}
