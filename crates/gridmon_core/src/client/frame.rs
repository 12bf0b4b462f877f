//! Frames and client messages of the cluster's binary client protocol.
//!
//! A frame is a little-endian `i32` length (including the 6-byte header),
//! `u16` flags and the content. A message is a run of frames ending with one
//! flagged `IS_FINAL`. Large messages may arrive as fragments that share a
//! fragmentation id; the codec reassembles them before yielding.

use crate::error::GridError;

use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;
use tokio_util::codec::{Decoder, Encoder};

/// Bytes sent once after the socket opens.
pub const PROTOCOL_HEADER: &[u8] = b"CP2";

/// Size of the frame length + flags header.
pub const FRAME_HEADER_SIZE: usize = 6;

/// Frames larger than this are rejected as corrupt.
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

pub const BEGIN_FRAGMENT_FLAG: u16 = 1 << 15;
pub const END_FRAGMENT_FLAG: u16 = 1 << 14;
pub const UNFRAGMENTED_MESSAGE: u16 = BEGIN_FRAGMENT_FLAG | END_FRAGMENT_FLAG;
pub const IS_FINAL_FLAG: u16 = 1 << 13;
pub const BEGIN_DATA_STRUCTURE_FLAG: u16 = 1 << 12;
pub const END_DATA_STRUCTURE_FLAG: u16 = 1 << 11;
pub const IS_NULL_FLAG: u16 = 1 << 10;
pub const IS_EVENT_FLAG: u16 = 1 << 9;

/// Offset of the message type in an initial frame.
pub const TYPE_OFFSET: usize = 0;
/// Offset of the correlation id in an initial frame.
pub const CORRELATION_ID_OFFSET: usize = 4;
/// Offset of the partition id in a request's initial frame.
pub const PARTITION_ID_OFFSET: usize = 12;
/// First fixed-size parameter of a request.
pub const REQUEST_HEADER_SIZE: usize = 16;
/// First fixed-size parameter of a response (after the backup-ack byte).
pub const RESPONSE_HEADER_SIZE: usize = 13;

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Frame flags
    pub flags: u16,
    /// Frame content
    pub content: Vec<u8>,
}

impl Frame {
    /// Create a data frame.
    pub fn new(content: Vec<u8>) -> Self {
        Self { flags: 0, content }
    }

    /// Create a frame with explicit flags.
    pub fn with_flags(content: Vec<u8>, flags: u16) -> Self {
        Self { flags, content }
    }

    /// Start of a nested structure or list.
    pub fn begin() -> Self {
        Self::with_flags(Vec::new(), BEGIN_DATA_STRUCTURE_FLAG)
    }

    /// End of a nested structure or list.
    pub fn end() -> Self {
        Self::with_flags(Vec::new(), END_DATA_STRUCTURE_FLAG)
    }

    /// A null value.
    pub fn null() -> Self {
        Self::with_flags(Vec::new(), IS_NULL_FLAG)
    }

    pub fn is_begin(&self) -> bool {
        self.flags & BEGIN_DATA_STRUCTURE_FLAG != 0
    }

    pub fn is_end(&self) -> bool {
        self.flags & END_DATA_STRUCTURE_FLAG != 0
    }

    pub fn is_null(&self) -> bool {
        self.flags & IS_NULL_FLAG != 0
    }

    pub fn is_final(&self) -> bool {
        self.flags & IS_FINAL_FLAG != 0
    }

    fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.content.len()
    }
}

/// A complete client message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientMessage {
    frames: Vec<Frame>,
}

impl ClientMessage {
    /// Create a message from frames; the first is the initial frame.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// All frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The initial frame.
    pub fn initial_frame(&self) -> Result<&Frame, GridError> {
        self.frames.first().ok_or_else(|| GridError::protocol("Message has no frames"))
    }

    /// Message type from the initial frame.
    pub fn message_type(&self) -> Result<i32, GridError> {
        let frame = self.initial_frame()?;
        super::codec::read_i32(&frame.content, TYPE_OFFSET)
    }

    /// Correlation id from the initial frame.
    pub fn correlation_id(&self) -> Result<i64, GridError> {
        let frame = self.initial_frame()?;
        super::codec::read_i64(&frame.content, CORRELATION_ID_OFFSET)
    }

    /// Overwrite the correlation id in the initial frame.
    pub fn set_correlation_id(&mut self, id: i64) -> Result<(), GridError> {
        let frame = self
            .frames
            .first_mut()
            .ok_or_else(|| GridError::protocol("Message has no frames"))?;
        let slot = frame
            .content
            .get_mut(CORRELATION_ID_OFFSET..CORRELATION_ID_OFFSET + 8)
            .ok_or_else(|| GridError::protocol("Initial frame too short for a correlation id"))?;
        slot.copy_from_slice(&id.to_le_bytes());
        Ok(())
    }

    /// Check if the message is an event rather than a response.
    pub fn is_event(&self) -> bool {
        self.frames.first().is_some_and(|f| f.flags & IS_EVENT_FLAG != 0)
    }

    /// Reader positioned after the initial frame.
    pub fn reader(&self) -> FrameReader<'_> {
        FrameReader { frames: &self.frames, pos: 1 }
    }
}

/// Sequential cursor over a message's frames.
#[derive(Debug)]
pub struct FrameReader<'a> {
    frames: &'a [Frame],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Reader over arbitrary frames, starting at the first.
    pub fn over(frames: &'a [Frame]) -> Self {
        Self { frames, pos: 0 }
    }

    /// Take the next frame.
    pub fn next_frame(&mut self) -> Result<&'a Frame, GridError> {
        let frame = self
            .frames
            .get(self.pos)
            .ok_or_else(|| GridError::protocol("Unexpected end of message"))?;
        self.pos += 1;
        Ok(frame)
    }

    /// Look at the next frame without taking it.
    pub fn peek(&self) -> Option<&'a Frame> {
        self.frames.get(self.pos)
    }

    /// Check if frames remain.
    pub fn has_next(&self) -> bool {
        self.pos < self.frames.len()
    }

    /// Check if the next frame closes the current structure.
    pub fn next_is_end(&self) -> bool {
        self.peek().is_some_and(Frame::is_end)
    }

    /// Check if the next frame is a null marker.
    pub fn next_is_null(&self) -> bool {
        self.peek().is_some_and(Frame::is_null)
    }

    /// Take a frame that must open a structure.
    pub fn expect_begin(&mut self) -> Result<(), GridError> {
        if self.next_frame()?.is_begin() {
            Ok(())
        } else {
            Err(GridError::protocol("Expected the start of a structure"))
        }
    }

    /// Skip to just past the end frame of the current structure.
    ///
    /// Tolerates fields appended by newer members.
    pub fn skip_to_end_of_structure(&mut self) -> Result<(), GridError> {
        let mut open = 1usize;
        while open > 0 {
            let frame = self.next_frame()?;
            if frame.is_end() {
                open -= 1;
            } else if frame.is_begin() {
                open += 1;
            }
        }
        Ok(())
    }
}

/// Tokio codec for framed client messages.
#[derive(Debug, Default)]
pub struct ClientMessageCodec {
    pending: Vec<Frame>,
    fragments: HashMap<i64, Vec<Frame>>,
}

impl ClientMessageCodec {
    /// Turn a completed frame run into a message, or buffer it as a fragment.
    fn assemble(&mut self, mut frames: Vec<Frame>) -> Result<Option<ClientMessage>, GridError> {
        let first_flags = frames.first().map(|f| f.flags).unwrap_or_default();
        if first_flags & UNFRAGMENTED_MESSAGE == UNFRAGMENTED_MESSAGE {
            return Ok(Some(ClientMessage::new(frames)));
        }

        // Fragment: the first frame carries only the fragmentation id.
        let header = frames.remove(0);
        let id = super::codec::read_i64(&header.content, 0)?;
        if header.flags & BEGIN_FRAGMENT_FLAG != 0 {
            self.fragments.insert(id, frames);
            return Ok(None);
        }

        let buffered = self
            .fragments
            .get_mut(&id)
            .ok_or_else(|| GridError::protocol(format!("Fragment for unknown message {id}")))?;
        buffered.extend(frames);

        if header.flags & END_FRAGMENT_FLAG != 0 {
            let frames = self.fragments.remove(&id).unwrap_or_default();
            return Ok(Some(ClientMessage::new(frames)));
        }
        Ok(None)
    }
}

impl Decoder for ClientMessageCodec {
    type Item = ClientMessage;
    type Error = GridError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < FRAME_HEADER_SIZE {
                return Ok(None);
            }

            let len = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            let len = usize::try_from(len)
                .ok()
                .filter(|len| (FRAME_HEADER_SIZE..=MAX_FRAME_SIZE).contains(len))
                .ok_or_else(|| GridError::protocol(format!("Invalid frame length {len}")))?;

            if src.len() < len {
                src.reserve(len - src.len());
                return Ok(None);
            }

            let mut raw = src.split_to(len);
            raw.advance(4);
            let flags = raw.get_u16_le();
            let frame = Frame::with_flags(raw.to_vec(), flags);
            let is_final = frame.is_final();
            self.pending.push(frame);

            if is_final {
                let frames = std::mem::take(&mut self.pending);
                if let Some(message) = self.assemble(frames)? {
                    return Ok(Some(message));
                }
            }
        }
    }
}

impl Encoder<ClientMessage> for ClientMessageCodec {
    type Error = GridError;

    fn encode(&mut self, item: ClientMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total: usize = item.frames.iter().map(Frame::encoded_len).sum();
        dst.reserve(total);

        let last = item.frames.len().saturating_sub(1);
        for (i, frame) in item.frames.iter().enumerate() {
            let mut flags = frame.flags;
            if i == 0 {
                flags |= UNFRAGMENTED_MESSAGE;
            }
            if i == last {
                flags |= IS_FINAL_FLAG;
            }
            let len = i32::try_from(frame.encoded_len())
                .map_err(|_| GridError::protocol("Frame too large to encode"))?;
            dst.put_i32_le(len);
            dst.put_u16_le(flags);
            dst.put_slice(&frame.content);
        }
        Ok(())
    }
}
