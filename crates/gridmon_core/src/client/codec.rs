//! Field codecs shared by the message encoders and decoders.
//!
//! Fixed-size fields are little-endian and live in the initial frame; every
//! variable-size field gets a frame of its own.

use super::frame::{ClientMessage, Frame, FrameReader, PARTITION_ID_OFFSET, REQUEST_HEADER_SIZE};
use crate::error::{GridError, GridResult};
use crate::models::Data;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

/// Encoded size of a nullable UUID.
pub const UUID_SIZE: usize = 17;
/// Encoded size of a `LocalDateTime`.
pub const LOCAL_DATE_TIME_SIZE: usize = 13;

const LIST_CN_HEADER_SIZE: usize = 5;
const LIST_CN_NULL_ONLY: u8 = 1;
const LIST_CN_NOT_NULL_ONLY: u8 = 2;
const LIST_CN_MIXED: u8 = 3;
const ITEMS_PER_BITMASK: usize = 8;

fn slice<const N: usize>(buf: &[u8], offset: usize) -> GridResult<[u8; N]> {
    buf.get(offset..offset + N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            GridError::protocol(format!(
                "Field at offset {offset} ({N} bytes) is past the end of a {}-byte frame",
                buf.len()
            ))
        })
}

pub fn read_u8(buf: &[u8], offset: usize) -> GridResult<u8> {
    Ok(slice::<1>(buf, offset)?[0])
}

pub fn read_bool(buf: &[u8], offset: usize) -> GridResult<bool> {
    Ok(read_u8(buf, offset)? != 0)
}

pub fn read_i32(buf: &[u8], offset: usize) -> GridResult<i32> {
    slice::<4>(buf, offset).map(i32::from_le_bytes)
}

pub fn read_i64(buf: &[u8], offset: usize) -> GridResult<i64> {
    slice::<8>(buf, offset).map(i64::from_le_bytes)
}

/// Read a nullable UUID: a null flag, then the most and least significant halves.
pub fn read_uuid(buf: &[u8], offset: usize) -> GridResult<Option<Uuid>> {
    if read_bool(buf, offset)? {
        return Ok(None);
    }
    let msb = read_i64(buf, offset + 1)? as u64;
    let lsb = read_i64(buf, offset + 9)? as u64;
    Ok(Some(Uuid::from_u64_pair(msb, lsb)))
}

pub fn write_uuid(buf: &mut Vec<u8>, uuid: Option<Uuid>) {
    match uuid {
        None => {
            buf.push(1);
            buf.extend_from_slice(&[0; 16]);
        }
        Some(uuid) => {
            let (msb, lsb) = uuid.as_u64_pair();
            buf.push(0);
            buf.extend_from_slice(&(msb as i64).to_le_bytes());
            buf.extend_from_slice(&(lsb as i64).to_le_bytes());
        }
    }
}

/// Read a `LocalDateTime`: year, month, day, hour, minute, second, nanos.
pub fn read_local_date_time(buf: &[u8], offset: usize) -> GridResult<NaiveDateTime> {
    let year = read_i32(buf, offset)?;
    let month = read_u8(buf, offset + 4)?;
    let day = read_u8(buf, offset + 5)?;
    let hour = read_u8(buf, offset + 6)?;
    let minute = read_u8(buf, offset + 7)?;
    let second = read_u8(buf, offset + 8)?;
    let nano = read_i32(buf, offset + 9)?;

    NaiveDate::from_ymd_opt(year, month.into(), day.into())
        .and_then(|date| {
            date.and_hms_nano_opt(hour.into(), minute.into(), second.into(), nano as u32)
        })
        .ok_or_else(|| {
            GridError::protocol(format!(
                "Invalid timestamp {year}-{month}-{day} {hour}:{minute}:{second}.{nano}"
            ))
        })
}

/// Builder for request messages.
#[derive(Debug)]
pub struct RequestBuilder {
    initial: Vec<u8>,
    frames: Vec<Frame>,
}

impl RequestBuilder {
    /// Start a request of the given type with no partition.
    pub fn new(message_type: i32) -> Self {
        let mut initial = Vec::with_capacity(REQUEST_HEADER_SIZE + 32);
        initial.extend_from_slice(&message_type.to_le_bytes());
        initial.extend_from_slice(&0i64.to_le_bytes());
        debug_assert_eq!(initial.len(), PARTITION_ID_OFFSET);
        initial.extend_from_slice(&(-1i32).to_le_bytes());
        Self { initial, frames: Vec::new() }
    }

    pub fn fixed_u8(mut self, value: u8) -> Self {
        self.initial.push(value);
        self
    }

    pub fn fixed_bool(self, value: bool) -> Self {
        self.fixed_u8(u8::from(value))
    }

    pub fn fixed_i32(mut self, value: i32) -> Self {
        self.initial.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn fixed_i64(mut self, value: i64) -> Self {
        self.initial.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn fixed_uuid(mut self, value: Option<Uuid>) -> Self {
        write_uuid(&mut self.initial, value);
        self
    }

    /// Append a raw frame.
    pub fn frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Append a UTF-8 string frame.
    pub fn string(self, value: &str) -> Self {
        self.frame(Frame::new(value.as_bytes().to_vec()))
    }

    /// Append a null marker.
    pub fn null(self) -> Self {
        self.frame(Frame::null())
    }

    /// Append a list of strings.
    pub fn string_list(mut self, values: &[String]) -> Self {
        self.frames.push(Frame::begin());
        self.frames.extend(values.iter().map(|v| Frame::new(v.as_bytes().to_vec())));
        self.frames.push(Frame::end());
        self
    }

    /// Finish the message; the correlation id is assigned on send.
    pub fn build(self) -> ClientMessage {
        let mut frames = Vec::with_capacity(self.frames.len() + 1);
        frames.push(Frame::new(self.initial));
        frames.extend(self.frames);
        ClientMessage::new(frames)
    }
}

pub fn decode_string(reader: &mut FrameReader<'_>) -> GridResult<String> {
    let frame = reader.next_frame()?;
    String::from_utf8(frame.content.clone())
        .map_err(|_| GridError::protocol("String frame is not valid UTF-8"))
}

/// Decode an optional value written as a null marker or the value itself.
pub fn decode_nullable<'a, T>(
    reader: &mut FrameReader<'a>,
    decode: impl FnOnce(&mut FrameReader<'a>) -> GridResult<T>,
) -> GridResult<Option<T>> {
    if reader.next_is_null() {
        reader.next_frame()?;
        return Ok(None);
    }
    decode(reader).map(Some)
}

/// Decode a list whose items may span several frames.
pub fn decode_list<'a, T>(
    reader: &mut FrameReader<'a>,
    mut decode: impl FnMut(&mut FrameReader<'a>) -> GridResult<T>,
) -> GridResult<Vec<T>> {
    reader.expect_begin()?;
    let mut items = Vec::new();
    while !reader.next_is_end() {
        items.push(decode(reader)?);
    }
    reader.next_frame()?;
    Ok(items)
}

pub fn decode_string_list(reader: &mut FrameReader<'_>) -> GridResult<Vec<String>> {
    decode_list(reader, decode_string)
}

pub fn decode_data(reader: &mut FrameReader<'_>) -> GridResult<Data> {
    Ok(Data::new(reader.next_frame()?.content.clone()))
}

/// Decode a frame of packed `i32` values.
pub fn decode_int_list(frame: &Frame) -> GridResult<Vec<i32>> {
    if frame.content.len() % 4 != 0 {
        return Err(GridError::protocol("Integer list frame has a partial item"));
    }
    Ok(frame
        .content
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Number of items in a compact nullable fixed-size list frame.
pub fn list_cn_count(frame: &Frame) -> GridResult<usize> {
    let count = read_i32(&frame.content, 1)?;
    usize::try_from(count).map_err(|_| GridError::protocol(format!("Negative list size {count}")))
}

/// Decode a compact nullable list of fixed-size items.
///
/// The header holds a kind byte and the item count. Mixed lists prefix
/// every run of up to eight items with a bitmask whose set bits mark
/// present values; only present values are stored.
pub fn decode_list_cn<T>(
    frame: &Frame,
    item_size: usize,
    decode: impl Fn(&[u8], usize) -> GridResult<T>,
) -> GridResult<Vec<Option<T>>> {
    let content = &frame.content;
    let kind = read_u8(content, 0)?;
    let count = list_cn_count(frame)?;
    let mut items = Vec::with_capacity(count);

    match kind {
        LIST_CN_NULL_ONLY => items.resize_with(count, || None),
        LIST_CN_NOT_NULL_ONLY => {
            for i in 0..count {
                items.push(Some(decode(content, LIST_CN_HEADER_SIZE + i * item_size)?));
            }
        }
        LIST_CN_MIXED => {
            let mut position = LIST_CN_HEADER_SIZE;
            while items.len() < count {
                let bitmask = read_u8(content, position)?;
                position += 1;
                for bit in 0..ITEMS_PER_BITMASK {
                    if items.len() == count {
                        break;
                    }
                    if bitmask & (1 << bit) != 0 {
                        items.push(Some(decode(content, position)?));
                        position += item_size;
                    } else {
                        items.push(None);
                    }
                }
            }
        }
        other => return Err(GridError::protocol(format!("Unknown compact list kind {other}"))),
    }
    Ok(items)
}

/// Count the top-level items of a multi-frame list and skip past it.
pub fn count_list_items(reader: &mut FrameReader<'_>) -> GridResult<usize> {
    reader.expect_begin()?;
    let mut count = 0;
    loop {
        let frame = reader.next_frame()?;
        if frame.is_end() {
            return Ok(count);
        }
        count += 1;
        if frame.is_begin() {
            reader.skip_to_end_of_structure()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_cn(kind: u8, count: i32, body: &[u8]) -> Frame {
        let mut content = vec![kind];
        content.extend_from_slice(&count.to_le_bytes());
        content.extend_from_slice(body);
        Frame::new(content)
    }

    #[test]
    fn test_fixed_reads_are_bounds_checked() {
        let buf = [1, 0, 0, 0, 2];
        assert_eq!(read_i32(&buf, 0).unwrap(), 1);
        assert!(read_i32(&buf, 2).is_err());
        assert!(read_i64(&buf, 0).is_err());
        assert!(read_u8(&buf, 5).is_err());
    }

    #[test]
    fn test_uuid_round_trip() {
        let uuid = Uuid::new_v4();
        let mut buf = Vec::new();
        write_uuid(&mut buf, Some(uuid));
        write_uuid(&mut buf, None);
        assert_eq!(buf.len(), 2 * UUID_SIZE);
        assert_eq!(read_uuid(&buf, 0).unwrap(), Some(uuid));
        assert_eq!(read_uuid(&buf, UUID_SIZE).unwrap(), None);
    }

    #[test]
    fn test_local_date_time() {
        let mut buf = 2024i32.to_le_bytes().to_vec();
        buf.extend_from_slice(&[3, 15, 10, 30, 5]);
        buf.extend_from_slice(&0i32.to_le_bytes());
        let ts = read_local_date_time(&buf, 0).unwrap();
        assert_eq!(ts.to_string(), "2024-03-15 10:30:05");

        buf[4] = 13;
        assert!(read_local_date_time(&buf, 0).is_err());
    }

    #[test]
    fn test_request_builder_layout() {
        let message = RequestBuilder::new(0x210500).fixed_i32(4096).string("x").build();
        let initial = &message.frames()[0].content;
        assert_eq!(initial.len(), REQUEST_HEADER_SIZE + 4);
        assert_eq!(read_i32(initial, 0).unwrap(), 0x210500);
        assert_eq!(read_i32(initial, PARTITION_ID_OFFSET).unwrap(), -1);
        assert_eq!(read_i32(initial, REQUEST_HEADER_SIZE).unwrap(), 4096);
        assert_eq!(message.frames()[1].content, b"x");
    }

    #[test]
    fn test_list_cn_null_only() {
        let frame = list_cn(LIST_CN_NULL_ONLY, 3, &[]);
        let items = decode_list_cn(&frame, 8, read_i64).unwrap();
        assert_eq!(items, vec![None, None, None]);
    }

    #[test]
    fn test_list_cn_not_null_only() {
        let mut body = 5i64.to_le_bytes().to_vec();
        body.extend_from_slice(&(-6i64).to_le_bytes());
        let frame = list_cn(LIST_CN_NOT_NULL_ONLY, 2, &body);
        let items = decode_list_cn(&frame, 8, read_i64).unwrap();
        assert_eq!(items, vec![Some(5), Some(-6)]);
    }

    #[test]
    fn test_list_cn_mixed_spans_bitmasks() {
        // Ten items: present at 0, 2 and 9.
        let mut body = vec![0b0000_0101];
        body.extend_from_slice(&1i64.to_le_bytes());
        body.extend_from_slice(&3i64.to_le_bytes());
        body.push(0b0000_0010);
        body.extend_from_slice(&10i64.to_le_bytes());
        let frame = list_cn(LIST_CN_MIXED, 10, &body);

        let items = decode_list_cn(&frame, 8, read_i64).unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(items[0], Some(1));
        assert_eq!(items[1], None);
        assert_eq!(items[2], Some(3));
        assert_eq!(items[8], None);
        assert_eq!(items[9], Some(10));
    }

    #[test]
    fn test_list_cn_truncated_is_error() {
        let frame = list_cn(LIST_CN_NOT_NULL_ONLY, 2, &1i64.to_le_bytes());
        assert!(decode_list_cn(&frame, 8, read_i64).is_err());
    }

    #[test]
    fn test_count_list_items_with_nesting() {
        let frames = vec![
            Frame::begin(),
            Frame::new(vec![1]),
            Frame::null(),
            Frame::begin(),
            Frame::new(vec![2]),
            Frame::end(),
            Frame::end(),
            Frame::new(vec![9]),
        ];
        let mut reader = FrameReader::over(&frames);
        assert_eq!(count_list_items(&mut reader).unwrap(), 3);
        assert_eq!(reader.next_frame().unwrap().content, vec![9]);
    }

    #[test]
    fn test_decode_nullable_and_string_list() {
        let frames = vec![
            Frame::null(),
            Frame::begin(),
            Frame::new(b"a".to_vec()),
            Frame::new(b"b".to_vec()),
            Frame::end(),
        ];
        let mut reader = FrameReader::over(&frames);
        assert_eq!(decode_nullable(&mut reader, decode_string).unwrap(), None);
        assert_eq!(decode_string_list(&mut reader).unwrap(), vec!["a", "b"]);
        assert!(!reader.has_next());
    }
}
