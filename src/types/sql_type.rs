use std::fmt;

/// Wire-level PostgreSQL type used to annotate bind placeholders.
///
/// The `Display` form is exactly what gets appended after `::` in a typed
/// placeholder such as `$1::INTEGER`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Varchar(Option<u32>),
    Text,
    Bytea,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    Jsonb,
    Interval,
    HStore,
    DateRange,
    TsRange,
    TsTzRange,
    Int4Range,
    Int8Range,
    NumRange,
    Array(Box<SqlType>),
    /// Any other type, rendered verbatim (domains, enums, extensions).
    Named(String),
}

impl SqlType {
    pub fn array_of(element: SqlType) -> Self {
        SqlType::Array(Box::new(element))
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            SqlType::DateRange
                | SqlType::TsRange
                | SqlType::TsTzRange
                | SqlType::Int4Range
                | SqlType::Int8Range
                | SqlType::NumRange
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::SmallInt => write!(f, "SMALLINT"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::Real => write!(f, "REAL"),
            SqlType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            SqlType::Numeric => write!(f, "NUMERIC"),
            SqlType::Varchar(None) => write!(f, "VARCHAR"),
            SqlType::Varchar(Some(len)) => write!(f, "VARCHAR({})", len),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Bytea => write!(f, "BYTEA"),
            SqlType::Date => write!(f, "DATE"),
            SqlType::Time => write!(f, "TIME WITHOUT TIME ZONE"),
            SqlType::Timestamp => write!(f, "TIMESTAMP WITHOUT TIME ZONE"),
            SqlType::TimestampTz => write!(f, "TIMESTAMP WITH TIME ZONE"),
            SqlType::Uuid => write!(f, "UUID"),
            SqlType::Json => write!(f, "JSON"),
            SqlType::Jsonb => write!(f, "JSONB"),
            SqlType::Interval => write!(f, "INTERVAL"),
            SqlType::HStore => write!(f, "HSTORE"),
            SqlType::DateRange => write!(f, "DATERANGE"),
            SqlType::TsRange => write!(f, "TSRANGE"),
            SqlType::TsTzRange => write!(f, "TSTZRANGE"),
            SqlType::Int4Range => write!(f, "INT4RANGE"),
            SqlType::Int8Range => write!(f, "INT8RANGE"),
            SqlType::NumRange => write!(f, "NUMRANGE"),
            SqlType::Array(element) => write!(f, "{}[]", element),
            SqlType::Named(name) => write!(f, "{}", name),
        }
    }
}
