// Mapped row types and their table definitions

use crate::value::SqlValue;
use sqlx::postgres::PgRow;
use sqlx::FromRow;
use std::fmt;

/// PostgreSQL column types understood by auto-migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    /// Auto-incrementing `INTEGER`
    Serial,
    /// Auto-incrementing `BIGINT`
    BigSerial,
    Real,
    Double,
    Numeric,
    Boolean,
    Text,
    Varchar(u32),
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Jsonb,
    Bytea,
}

impl ColumnType {
    /// Whether the database generates values for this type
    pub fn is_auto_increment(self) -> bool {
        matches!(self, ColumnType::Serial | ColumnType::BigSerial)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::SmallInt => write!(f, "SMALLINT"),
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::Serial => write!(f, "SERIAL"),
            ColumnType::BigSerial => write!(f, "BIGSERIAL"),
            ColumnType::Real => write!(f, "REAL"),
            ColumnType::Double => write!(f, "DOUBLE PRECISION"),
            ColumnType::Numeric => write!(f, "NUMERIC"),
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Varchar(size) => write!(f, "VARCHAR({})", size),
            ColumnType::Uuid => write!(f, "UUID"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::TimestampTz => write!(f, "TIMESTAMPTZ"),
            ColumnType::Date => write!(f, "DATE"),
            ColumnType::Jsonb => write!(f, "JSONB"),
            ColumnType::Bytea => write!(f, "BYTEA"),
        }
    }
}

/// One column of a mapped table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub primary_key: bool,
    /// Value is generated by the database when omitted on insert
    pub generated: bool,
    pub unique: bool,
    pub not_null: bool,
    /// Raw SQL default expression, e.g. `now()` or `true`
    pub default: Option<&'static str>,
    pub index: bool,
    /// `table(column)` referenced by a foreign key
    pub references: Option<&'static str>,
}

impl Column {
    pub fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            primary_key: false,
            generated: column_type.is_auto_increment(),
            unique: false,
            not_null: false,
            default: None,
            index: false,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark the column as filled in by the database (defaults, triggers)
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn references(mut self, target: &'static str) -> Self {
        self.references = Some(target);
        self
    }
}

/// A row type stored in one table
///
/// Implementations describe the table and hand out the record's values;
/// decoding goes through `sqlx::FromRow`, so column names must match the
/// struct's fields (or its `#[sqlx(rename)]`s).
///
/// ```
/// use pgconnect::entity::{Column, ColumnType, Entity};
/// use pgconnect::value::SqlValue;
///
/// #[derive(Debug, Clone, sqlx::FromRow)]
/// struct Account {
///     id: Option<i64>,
///     email: String,
///     status: String,
/// }
///
/// impl Entity for Account {
///     const TABLE: &'static str = "accounts";
///
///     fn columns() -> Vec<Column> {
///         vec![
///             Column::new("id", ColumnType::BigSerial).primary_key(),
///             Column::new("email", ColumnType::Varchar(255)).unique().not_null(),
///             Column::new("status", ColumnType::Text).not_null().default("'active'").index(),
///         ]
///     }
///
///     fn values(&self) -> Vec<(&'static str, SqlValue)> {
///         vec![
///             ("id", self.id.into()),
///             ("email", self.email.clone().into()),
///             ("status", self.status.clone().into()),
///         ]
///     }
///
///     fn primary_key(&self) -> SqlValue {
///         self.id.into()
///     }
/// }
/// ```
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;

    const PRIMARY_KEY: &'static str = "id";

    /// `ORDER BY` fragment for listing queries, e.g. `"created_at DESC"`
    const DEFAULT_ORDER: Option<&'static str> = None;

    fn columns() -> Vec<Column>;

    /// Column name and value pairs for this record, primary key included
    fn values(&self) -> Vec<(&'static str, SqlValue)>;

    /// Primary key value; NULL when not yet assigned
    fn primary_key(&self) -> SqlValue;
}

/// Table definition handed to auto-migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn of<T: Entity>() -> Self {
        Self {
            table: T::TABLE,
            columns: T::columns(),
        }
    }
}

/// Name of every column the database fills in on insert
pub(crate) fn generated_columns<T: Entity>() -> Vec<&'static str> {
    T::columns()
        .into_iter()
        .filter(|c| c.generated)
        .map(|c| c.name)
        .collect()
}
