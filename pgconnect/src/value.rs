// Typed bind parameters

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// An owned query parameter
///
/// Every variant wraps an `Option` so that NULL keeps its SQL type when bound;
/// PostgreSQL rejects an untyped NULL in most column positions.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(Option<bool>),
    SmallInt(Option<i16>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Real(Option<f32>),
    Double(Option<f64>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<Utc>>),
    Date(Option<NaiveDate>),
    Json(Option<serde_json::Value>),
    Bytes(Option<Vec<u8>>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Bool(v) => v.is_none(),
            SqlValue::SmallInt(v) => v.is_none(),
            SqlValue::Int(v) => v.is_none(),
            SqlValue::BigInt(v) => v.is_none(),
            SqlValue::Real(v) => v.is_none(),
            SqlValue::Double(v) => v.is_none(),
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Uuid(v) => v.is_none(),
            SqlValue::Timestamp(v) => v.is_none(),
            SqlValue::Date(v) => v.is_none(),
            SqlValue::Json(v) => v.is_none(),
            SqlValue::Bytes(v) => v.is_none(),
        }
    }

    /// Append this value to `builder` as the next `$n` parameter
    pub(crate) fn push_bind<'args>(self, builder: &mut QueryBuilder<'args, Postgres>) {
        match self {
            SqlValue::Bool(v) => builder.push_bind(v),
            SqlValue::SmallInt(v) => builder.push_bind(v),
            SqlValue::Int(v) => builder.push_bind(v),
            SqlValue::BigInt(v) => builder.push_bind(v),
            SqlValue::Real(v) => builder.push_bind(v),
            SqlValue::Double(v) => builder.push_bind(v),
            SqlValue::Text(v) => builder.push_bind(v),
            SqlValue::Uuid(v) => builder.push_bind(v),
            SqlValue::Timestamp(v) => builder.push_bind(v),
            SqlValue::Date(v) => builder.push_bind(v),
            SqlValue::Json(v) => builder.push_bind(v),
            SqlValue::Bytes(v) => builder.push_bind(v),
        };
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(Some(v.into()))
                }
            }

            impl From<Option<$ty>> for SqlValue {
                fn from(v: Option<$ty>) -> Self {
                    SqlValue::$variant(v.map(Into::into))
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Real,
    f64 => Double,
    String => Text,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
    NaiveDate => Date,
    serde_json::Value => Json,
    Vec<u8> => Bytes,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(Some(v.to_string()))
    }
}

impl From<Option<&str>> for SqlValue {
    fn from(v: Option<&str>) -> Self {
        SqlValue::Text(v.map(str::to_string))
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(Some(v.clone()))
    }
}

impl From<&Uuid> for SqlValue {
    fn from(v: &Uuid) -> Self {
        SqlValue::Uuid(Some(*v))
    }
}
