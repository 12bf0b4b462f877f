//! Request encoders and response decoders for the messages the reporter uses.

use super::codec::{
    count_list_items, decode_data, decode_int_list, decode_list, decode_list_cn, decode_nullable,
    decode_string, read_i32, read_i64, read_local_date_time, read_u8, read_uuid, RequestBuilder,
    LOCAL_DATE_TIME_SIZE,
};
use super::frame::{ClientMessage, Frame, FrameReader, RESPONSE_HEADER_SIZE};
use crate::error::{GridError, GridResult};
use crate::models::{
    Data, DistributedObjectInfo, SqlColumnMetadata, SqlColumnType, SqlRow, SqlValue,
};

use uuid::Uuid;

pub const EXCEPTION: i32 = 0;
pub const CLIENT_AUTHENTICATION: i32 = 0x000100;
pub const CLIENT_GET_DISTRIBUTED_OBJECTS: i32 = 0x000800;
pub const CLIENT_PING: i32 = 0x000B00;
pub const CLIENT_STATISTICS: i32 = 0x000C00;
pub const MAP_ENTRY_SET: i32 = 0x012500;
pub const SQL_CLOSE: i32 = 0x210300;
pub const SQL_EXECUTE: i32 = 0x210400;
pub const SQL_FETCH: i32 = 0x210500;

/// Serialization version announced during authentication.
pub const SERIALIZATION_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Parameters of the authentication request.
#[derive(Debug, Clone)]
pub struct AuthenticationRequest<'a> {
    pub cluster_name: &'a str,
    pub client_uuid: Uuid,
    pub client_type: &'a str,
    pub client_version: &'a str,
    pub client_name: &'a str,
    pub labels: &'a [String],
}

pub fn encode_authentication(request: &AuthenticationRequest<'_>) -> ClientMessage {
    RequestBuilder::new(CLIENT_AUTHENTICATION)
        .fixed_uuid(Some(request.client_uuid))
        .fixed_u8(SERIALIZATION_VERSION)
        .string(request.cluster_name)
        .null()
        .null()
        .string(request.client_type)
        .string(request.client_version)
        .string(request.client_name)
        .string_list(request.labels)
        .build()
}

/// Outcome reported by the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationStatus {
    Authenticated,
    CredentialsFailed,
    SerializationVersionMismatch,
    NotAllowedInCluster,
    Unknown(u8),
}

impl From<u8> for AuthenticationStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Authenticated,
            1 => Self::CredentialsFailed,
            2 => Self::SerializationVersionMismatch,
            3 => Self::NotAllowedInCluster,
            other => Self::Unknown(other),
        }
    }
}

/// Decoded authentication response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResponse {
    pub status: AuthenticationStatus,
    pub member_uuid: Option<Uuid>,
    pub serialization_version: u8,
    pub partition_count: i32,
    pub cluster_id: Option<Uuid>,
}

pub fn decode_authentication(message: &ClientMessage) -> GridResult<AuthenticationResponse> {
    let initial = &message.initial_frame()?.content;
    let offset = RESPONSE_HEADER_SIZE;
    Ok(AuthenticationResponse {
        status: read_u8(initial, offset)?.into(),
        member_uuid: read_uuid(initial, offset + 1)?,
        serialization_version: read_u8(initial, offset + 18)?,
        partition_count: read_i32(initial, offset + 19)?,
        cluster_id: read_uuid(initial, offset + 23)?,
    })
}

// ---------------------------------------------------------------------------
// Housekeeping
// ---------------------------------------------------------------------------

pub fn encode_ping() -> ClientMessage {
    RequestBuilder::new(CLIENT_PING).build()
}

/// Statistics publication: collection time, flat attribute string, and an
/// empty compressed-metrics blob.
pub fn encode_statistics(timestamp_millis: i64, attributes: &str) -> ClientMessage {
    RequestBuilder::new(CLIENT_STATISTICS)
        .fixed_i64(timestamp_millis)
        .string(attributes)
        .frame(Frame::new(Vec::new()))
        .build()
}

// ---------------------------------------------------------------------------
// Distributed objects and maps
// ---------------------------------------------------------------------------

pub fn encode_get_distributed_objects() -> ClientMessage {
    RequestBuilder::new(CLIENT_GET_DISTRIBUTED_OBJECTS).build()
}

pub fn decode_get_distributed_objects(
    message: &ClientMessage,
) -> GridResult<Vec<DistributedObjectInfo>> {
    let mut reader = message.reader();
    decode_list(&mut reader, |r| {
        r.expect_begin()?;
        let service_name = decode_string(r)?;
        let name = decode_string(r)?;
        r.skip_to_end_of_structure()?;
        Ok(DistributedObjectInfo::new(service_name, name))
    })
}

pub fn encode_map_entry_set(name: &str) -> ClientMessage {
    RequestBuilder::new(MAP_ENTRY_SET).string(name).build()
}

/// Entries arrive as alternating key and value frames inside one list.
pub fn decode_map_entry_set(message: &ClientMessage) -> GridResult<Vec<(Data, Data)>> {
    let mut reader = message.reader();
    decode_list(&mut reader, |r| Ok((decode_data(r)?, decode_data(r)?)))
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

/// Identifies a query and its cursor on the coordinating member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlQueryId {
    pub member_id_high: i64,
    pub member_id_low: i64,
    pub local_id_high: i64,
    pub local_id_low: i64,
}

impl SqlQueryId {
    /// New query id owned by the given member, with a random local part.
    pub fn new(member_id: Uuid) -> Self {
        let (member_high, member_low) = member_id.as_u64_pair();
        let (local_high, local_low) = Uuid::new_v4().as_u64_pair();
        Self {
            member_id_high: member_high as i64,
            member_id_low: member_low as i64,
            local_id_high: local_high as i64,
            local_id_low: local_low as i64,
        }
    }

    fn frames(&self) -> [Frame; 3] {
        let mut content = Vec::with_capacity(32);
        for part in [self.member_id_high, self.member_id_low, self.local_id_high, self.local_id_low] {
            content.extend_from_slice(&part.to_le_bytes());
        }
        [Frame::begin(), Frame::new(content), Frame::end()]
    }
}

fn with_query_id(mut builder: RequestBuilder, query_id: &SqlQueryId) -> RequestBuilder {
    for frame in query_id.frames() {
        builder = builder.frame(frame);
    }
    builder
}

/// Execute a parameterless statement expecting any result type.
pub fn encode_sql_execute(sql: &str, query_id: &SqlQueryId, cursor_buffer_size: i32) -> ClientMessage {
    let builder = RequestBuilder::new(SQL_EXECUTE)
        .fixed_i64(-1)
        .fixed_i32(cursor_buffer_size)
        .fixed_u8(0)
        .fixed_bool(false)
        .string(sql)
        .frame(Frame::begin())
        .frame(Frame::end())
        .null();
    with_query_id(builder, query_id).build()
}

pub fn encode_sql_fetch(query_id: &SqlQueryId, cursor_buffer_size: i32) -> ClientMessage {
    let builder = RequestBuilder::new(SQL_FETCH).fixed_i32(cursor_buffer_size);
    with_query_id(builder, query_id).build()
}

pub fn encode_sql_close(query_id: &SqlQueryId) -> ClientMessage {
    with_query_id(RequestBuilder::new(SQL_CLOSE), query_id).build()
}

/// A page of rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlPage {
    pub rows: Vec<SqlRow>,
    /// No more pages follow
    pub last: bool,
}

/// A query failure reported by the member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlErrorInfo {
    pub code: i32,
    pub message: Option<String>,
    pub originating_member: Option<Uuid>,
    pub suggestion: Option<String>,
}

impl From<SqlErrorInfo> for GridError {
    fn from(error: SqlErrorInfo) -> Self {
        let message = error.message.unwrap_or_else(|| format!("SQL error {}", error.code));
        GridError::sql(error.code, message, error.suggestion)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlExecuteResponse {
    pub row_metadata: Option<Vec<SqlColumnMetadata>>,
    pub row_page: Option<SqlPage>,
    pub update_count: i64,
    pub error: Option<SqlErrorInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFetchResponse {
    pub row_page: Option<SqlPage>,
    pub error: Option<SqlErrorInfo>,
}

pub fn decode_sql_execute(message: &ClientMessage) -> GridResult<SqlExecuteResponse> {
    let update_count = read_i64(&message.initial_frame()?.content, RESPONSE_HEADER_SIZE)?;
    let mut reader = message.reader();
    let row_metadata =
        decode_nullable(&mut reader, |r| decode_list(r, decode_column_metadata))?;
    let row_page = decode_nullable(&mut reader, decode_sql_page)?;
    let error = decode_nullable(&mut reader, decode_sql_error)?;
    Ok(SqlExecuteResponse { row_metadata, row_page, update_count, error })
}

pub fn decode_sql_fetch(message: &ClientMessage) -> GridResult<SqlFetchResponse> {
    let mut reader = message.reader();
    let row_page = decode_nullable(&mut reader, decode_sql_page)?;
    let error = decode_nullable(&mut reader, decode_sql_error)?;
    Ok(SqlFetchResponse { row_page, error })
}

fn column_type(id: i32) -> GridResult<SqlColumnType> {
    SqlColumnType::from_id(id).ok_or_else(|| GridError::protocol(format!("Unknown column type {id}")))
}

fn decode_column_metadata(reader: &mut FrameReader<'_>) -> GridResult<SqlColumnMetadata> {
    reader.expect_begin()?;
    let initial = &reader.next_frame()?.content;
    let column_type = column_type(read_i32(initial, 0)?)?;
    // Older members omit the nullable flag.
    let nullable = initial.get(4).map_or(true, |b| *b != 0);
    let name = decode_string(reader)?;
    reader.skip_to_end_of_structure()?;
    Ok(SqlColumnMetadata { name, column_type, nullable })
}

fn decode_sql_error(reader: &mut FrameReader<'_>) -> GridResult<SqlErrorInfo> {
    reader.expect_begin()?;
    let initial = &reader.next_frame()?.content;
    let code = read_i32(initial, 0)?;
    let originating_member = read_uuid(initial, 4)?;
    let message = decode_nullable(reader, decode_string)?;
    let suggestion = if reader.next_is_end() {
        None
    } else {
        decode_nullable(reader, decode_string)?
    };
    reader.skip_to_end_of_structure()?;
    Ok(SqlErrorInfo { code, message, originating_member, suggestion })
}

/// Encoded item size of the compact-list column types.
fn fixed_item_size(column_type: SqlColumnType) -> Option<usize> {
    match column_type {
        SqlColumnType::Boolean | SqlColumnType::TinyInt => Some(1),
        SqlColumnType::SmallInt => Some(2),
        SqlColumnType::Integer | SqlColumnType::Real => Some(4),
        SqlColumnType::BigInt | SqlColumnType::Double => Some(8),
        SqlColumnType::Date => Some(6),
        SqlColumnType::Time => Some(7),
        SqlColumnType::Timestamp => Some(LOCAL_DATE_TIME_SIZE),
        SqlColumnType::TimestampWithTimeZone => Some(LOCAL_DATE_TIME_SIZE + 4),
        _ => None,
    }
}

fn or_null<T>(value: Option<T>, present: impl FnOnce(T) -> SqlValue) -> SqlValue {
    value.map_or(SqlValue::Null, present)
}

/// Decode one column of a page into values.
fn decode_column(
    reader: &mut FrameReader<'_>,
    column_type: SqlColumnType,
) -> GridResult<Vec<SqlValue>> {
    match column_type {
        SqlColumnType::Varchar => {
            let values = decode_list(reader, |r| decode_nullable(r, decode_string))?;
            Ok(values.into_iter().map(|v| or_null(v, SqlValue::Varchar)).collect())
        }
        SqlColumnType::BigInt => {
            let values = decode_list_cn(reader.next_frame()?, 8, read_i64)?;
            Ok(values.into_iter().map(|v| or_null(v, SqlValue::BigInt)).collect())
        }
        SqlColumnType::Timestamp => {
            let values =
                decode_list_cn(reader.next_frame()?, LOCAL_DATE_TIME_SIZE, read_local_date_time)?;
            Ok(values.into_iter().map(|v| or_null(v, SqlValue::Timestamp)).collect())
        }
        SqlColumnType::Null => {
            let count = read_i32(&reader.next_frame()?.content, 0)?;
            let count = usize::try_from(count)
                .map_err(|_| GridError::protocol(format!("Negative column size {count}")))?;
            Ok(vec![SqlValue::Null; count])
        }
        other => match fixed_item_size(other) {
            Some(size) => {
                let values = decode_list_cn(reader.next_frame()?, size, |buf, offset| {
                    buf.get(offset..offset + size).map(|_| ()).ok_or_else(|| {
                        GridError::protocol(format!("Truncated {other} column"))
                    })
                })?;
                Ok(values.into_iter().map(|v| or_null(v, |()| SqlValue::Unsupported)).collect())
            }
            None => Ok(vec![SqlValue::Unsupported; count_list_items(reader)?]),
        },
    }
}

/// Decode a column-major page and transpose it into rows.
fn decode_sql_page(reader: &mut FrameReader<'_>) -> GridResult<SqlPage> {
    reader.expect_begin()?;
    let last = read_u8(&reader.next_frame()?.content, 0)? == 1;
    let type_ids = decode_int_list(reader.next_frame()?)?;

    let mut columns = Vec::with_capacity(type_ids.len());
    for id in type_ids {
        columns.push(decode_column(reader, column_type(id)?)?);
    }
    reader.skip_to_end_of_structure()?;

    let row_count = columns.first().map_or(0, Vec::len);
    if columns.iter().any(|c| c.len() != row_count) {
        return Err(GridError::protocol("Page columns differ in length"));
    }

    let mut cells: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
    let rows = (0..row_count)
        .map(|_| SqlRow::new(cells.iter_mut().filter_map(Iterator::next).collect()))
        .collect();
    Ok(SqlPage { rows, last })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Convert an exception response into an error, using the outermost cause.
pub fn decode_exception(message: &ClientMessage) -> GridError {
    let mut reader = message.reader();
    let decoded = decode_list(&mut reader, |r| {
        r.expect_begin()?;
        let code = read_i32(&r.next_frame()?.content, 0)?;
        let class_name = decode_string(r)?;
        let text = decode_nullable(r, decode_string)?;
        r.skip_to_end_of_structure()?;
        Ok((code, class_name, text))
    });

    match decoded {
        Ok(errors) => match errors.into_iter().next() {
            Some((code, class_name, text)) => {
                GridError::remote(code, class_name, text.unwrap_or_default())
            }
            None => GridError::protocol("Exception response without errors"),
        },
        Err(e) => GridError::protocol(format!("Undecodable exception response: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::codec::write_uuid;
    use chrono::NaiveDate;

    fn response(fixed: &[u8], rest: Vec<Frame>) -> ClientMessage {
        let mut initial = 1i32.to_le_bytes().to_vec();
        initial.extend_from_slice(&3i64.to_le_bytes());
        initial.push(0);
        initial.extend_from_slice(fixed);
        let mut frames = vec![Frame::new(initial)];
        frames.extend(rest);
        ClientMessage::new(frames)
    }

    fn text(s: &str) -> Frame {
        Frame::new(s.as_bytes().to_vec())
    }

    fn int_list(values: &[i32]) -> Frame {
        Frame::new(values.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    fn list_cn(kind: u8, count: i32, body: &[u8]) -> Frame {
        let mut content = vec![kind];
        content.extend_from_slice(&count.to_le_bytes());
        content.extend_from_slice(body);
        Frame::new(content)
    }

    fn local_date_time(y: i32, mo: u8, d: u8, h: u8, mi: u8, s: u8) -> Vec<u8> {
        let mut buf = y.to_le_bytes().to_vec();
        buf.extend_from_slice(&[mo, d, h, mi, s]);
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf
    }

    fn page_frames(last: bool, type_ids: &[i32], columns: Vec<Vec<Frame>>) -> Vec<Frame> {
        let mut frames = vec![Frame::begin(), Frame::new(vec![u8::from(last)]), int_list(type_ids)];
        frames.extend(columns.into_iter().flatten());
        frames.push(Frame::end());
        frames
    }

    #[test]
    fn test_authentication_layout() {
        let labels = vec!["root".to_string()];
        let request = AuthenticationRequest {
            cluster_name: "grid1",
            client_uuid: Uuid::new_v4(),
            client_type: "RST",
            client_version: "0.1.0",
            client_name: "gridmon",
            labels: &labels,
        };
        let message = encode_authentication(&request);
        let frames = message.frames();
        assert_eq!(frames[0].content.len(), 16 + 17 + 1);
        assert_eq!(frames[1].content, b"grid1");
        assert!(frames[2].is_null() && frames[3].is_null());
        assert_eq!(frames[6].content, b"gridmon");
        assert!(frames[7].is_begin());
        assert_eq!(frames[8].content, b"root");
        assert!(frames[9].is_end());
    }

    #[test]
    fn test_decode_authentication_response() {
        let member = Uuid::new_v4();
        let mut fixed = vec![0];
        write_uuid(&mut fixed, Some(member));
        fixed.push(1);
        fixed.extend_from_slice(&271i32.to_le_bytes());
        write_uuid(&mut fixed, None);

        let decoded = decode_authentication(&response(&fixed, Vec::new())).unwrap();
        assert_eq!(decoded.status, AuthenticationStatus::Authenticated);
        assert_eq!(decoded.member_uuid, Some(member));
        assert_eq!(decoded.partition_count, 271);
        assert_eq!(decoded.cluster_id, None);
        assert_eq!(AuthenticationStatus::from(1), AuthenticationStatus::CredentialsFailed);
    }

    #[test]
    fn test_decode_distributed_objects() {
        let message = response(
            &[],
            vec![
                Frame::begin(),
                Frame::begin(),
                text("hz:impl:mapService"),
                text("trades"),
                Frame::end(),
                Frame::begin(),
                text("hz:impl:queueService"),
                text("__internal"),
                text("newer-field"),
                Frame::end(),
                Frame::end(),
            ],
        );
        let objects = decode_get_distributed_objects(&message).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0], DistributedObjectInfo::new("hz:impl:mapService", "trades"));
        assert_eq!(objects[1].name, "__internal");
    }

    #[test]
    fn test_decode_map_entry_set() {
        let key = Data::from_string("k");
        let value = Data::from_long(9);
        let message = response(
            &[],
            vec![
                Frame::begin(),
                Frame::new(key.as_bytes().to_vec()),
                Frame::new(value.as_bytes().to_vec()),
                Frame::end(),
            ],
        );
        let entries = decode_map_entry_set(&message).unwrap();
        assert_eq!(entries, vec![(key, value)]);
    }

    #[test]
    fn test_decode_execute_with_mixed_page() {
        let mut bigints = vec![0b0000_0001];
        bigints.extend_from_slice(&42i64.to_le_bytes());
        let mut timestamps = local_date_time(2024, 1, 2, 3, 4, 5);
        timestamps.extend(local_date_time(2025, 6, 7, 8, 9, 10));

        let mut frames = vec![
            Frame::begin(),
            Frame::begin(),
            Frame::new(vec![0, 0, 0, 0, 1]),
            text("name"),
            Frame::end(),
            Frame::begin(),
            Frame::new(5i32.to_le_bytes().to_vec()),
            text("count"),
            Frame::end(),
            Frame::end(),
        ];
        frames.extend(page_frames(
            true,
            &[0, 5, 11, 4],
            vec![
                vec![Frame::begin(), text("a"), Frame::null(), Frame::end()],
                vec![list_cn(3, 2, &bigints)],
                vec![list_cn(2, 2, &timestamps)],
                vec![list_cn(1, 2, &[])],
            ],
        ));
        frames.push(Frame::null());

        let decoded = decode_sql_execute(&response(&(-1i64).to_le_bytes(), frames)).unwrap();
        let metadata = decoded.row_metadata.unwrap();
        assert_eq!(metadata[0], SqlColumnMetadata::new("name", SqlColumnType::Varchar));
        assert_eq!(metadata[1].column_type, SqlColumnType::BigInt);
        assert!(metadata[1].nullable);
        assert_eq!(decoded.update_count, -1);
        assert!(decoded.error.is_none());

        let page = decoded.row_page.unwrap();
        assert!(page.last);
        assert_eq!(page.rows.len(), 2);
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap();
        assert_eq!(
            page.rows[0],
            SqlRow::new(vec![
                SqlValue::Varchar("a".into()),
                SqlValue::BigInt(42),
                SqlValue::Timestamp(expected),
                SqlValue::Null,
            ])
        );
        assert_eq!(page.rows[1].get(0), Some(&SqlValue::Null));
        assert_eq!(page.rows[1].get(1), Some(&SqlValue::Null));
    }

    #[test]
    fn test_decode_page_skips_unhandled_columns() {
        let mut decimals = vec![Frame::begin()];
        decimals.extend([Frame::new(vec![1, 2]), Frame::null(), Frame::end()]);
        let mut integers = vec![0b0000_0010];
        integers.extend_from_slice(&7i32.to_le_bytes());

        let mut frames = page_frames(
            false,
            &[6, 4, 14],
            vec![decimals, vec![list_cn(3, 2, &integers)], vec![Frame::new(2i32.to_le_bytes().to_vec())]],
        );
        frames.push(Frame::null());

        let decoded = decode_sql_fetch(&response(&[], frames)).unwrap();
        let page = decoded.row_page.unwrap();
        assert!(!page.last);
        assert_eq!(
            page.rows[0],
            SqlRow::new(vec![SqlValue::Unsupported, SqlValue::Null, SqlValue::Null])
        );
        assert_eq!(page.rows[1].get(1), Some(&SqlValue::Unsupported));
    }

    #[test]
    fn test_decode_fetch_error() {
        let mut fixed = 1008i32.to_le_bytes().to_vec();
        write_uuid(&mut fixed, None);
        let frames = vec![
            Frame::null(),
            Frame::begin(),
            Frame::new(fixed),
            text("Object 'nope' not found"),
            text("CREATE MAPPING nope ..."),
            Frame::end(),
        ];
        let decoded = decode_sql_fetch(&response(&[], frames)).unwrap();
        assert!(decoded.row_page.is_none());
        let error: GridError = decoded.error.unwrap().into();
        assert_eq!(error.to_string(), "Object 'nope' not found");
    }

    #[test]
    fn test_decode_exception() {
        let message = response(
            &[],
            vec![
                Frame::begin(),
                Frame::begin(),
                Frame::new(27i32.to_le_bytes().to_vec()),
                text("com.hazelcast.core.HazelcastException"),
                text("boom"),
                Frame::begin(),
                Frame::end(),
                Frame::end(),
                Frame::end(),
            ],
        );
        let error = decode_exception(&message);
        assert_eq!(error.to_string(), "com.hazelcast.core.HazelcastException: boom");
    }

    #[test]
    fn test_query_id_frames() {
        let id = SqlQueryId::new(Uuid::new_v4());
        let message = encode_sql_close(&id);
        let frames = message.frames();
        assert_eq!(frames.len(), 4);
        assert!(frames[1].is_begin());
        assert_eq!(frames[2].content.len(), 32);
        assert_eq!(read_i64(&frames[2].content, 16).unwrap(), id.local_id_high);
        assert!(frames[3].is_end());
    }
}
