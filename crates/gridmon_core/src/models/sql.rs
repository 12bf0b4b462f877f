//! SQL result models.

use chrono::NaiveDateTime;
use std::fmt;

/// Declared type of a result column, as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlColumnType {
    Varchar,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Real,
    Double,
    Date,
    Time,
    Timestamp,
    TimestampWithTimeZone,
    Object,
    Null,
    Json,
    Row,
}

impl SqlColumnType {
    /// Map a protocol type id.
    pub fn from_id(id: i32) -> Option<Self> {
        let column_type = match id {
            0 => Self::Varchar,
            1 => Self::Boolean,
            2 => Self::TinyInt,
            3 => Self::SmallInt,
            4 => Self::Integer,
            5 => Self::BigInt,
            6 => Self::Decimal,
            7 => Self::Real,
            8 => Self::Double,
            9 => Self::Date,
            10 => Self::Time,
            11 => Self::Timestamp,
            12 => Self::TimestampWithTimeZone,
            13 => Self::Object,
            14 => Self::Null,
            15 => Self::Json,
            16 => Self::Row,
            _ => return None,
        };
        Some(column_type)
    }

    /// SQL name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Varchar => "VARCHAR",
            Self::Boolean => "BOOLEAN",
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Decimal => "DECIMAL",
            Self::Real => "REAL",
            Self::Double => "DOUBLE",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampWithTimeZone => "TIMESTAMP_WITH_TIME_ZONE",
            Self::Object => "OBJECT",
            Self::Null => "NULL",
            Self::Json => "JSON",
            Self::Row => "ROW",
        }
    }
}

impl fmt::Display for SqlColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column metadata from a query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlColumnMetadata {
    /// Column name
    pub name: String,
    /// Declared type
    pub column_type: SqlColumnType,
    /// Whether the column may contain NULL
    pub nullable: bool,
}

impl SqlColumnMetadata {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, column_type: SqlColumnType) -> Self {
        Self { name: name.into(), column_type, nullable: true }
    }
}

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// VARCHAR value
    Varchar(String),
    /// BIGINT value
    BigInt(i64),
    /// TIMESTAMP value (no zone)
    Timestamp(NaiveDateTime),
    /// SQL NULL
    Null,
    /// A value of a type this client does not decode
    Unsupported,
}

impl SqlValue {
    /// Check if the value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One result row, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlRow {
    values: Vec<SqlValue>,
}

impl SqlRow {
    /// Create a row from its values.
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate values in column order.
    pub fn iter(&self) -> impl Iterator<Item = &SqlValue> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ids_round_trip_names() {
        assert_eq!(SqlColumnType::from_id(0), Some(SqlColumnType::Varchar));
        assert_eq!(SqlColumnType::from_id(5), Some(SqlColumnType::BigInt));
        assert_eq!(SqlColumnType::from_id(11), Some(SqlColumnType::Timestamp));
        assert_eq!(SqlColumnType::from_id(99), None);
        assert_eq!(SqlColumnType::TimestampWithTimeZone.to_string(), "TIMESTAMP_WITH_TIME_ZONE");
    }

    #[test]
    fn test_row_access() {
        let row = SqlRow::new(vec![SqlValue::Varchar("a".into()), SqlValue::Null]);
        assert_eq!(row.len(), 2);
        assert!(row.get(1).is_some_and(SqlValue::is_null));
        assert!(row.get(2).is_none());
    }
}
