// Statement generation for repository operations and auto-migration
//
// Every builder here produces exactly one statement. Values are always bound
// as parameters; only identifiers and `Entity::DEFAULT_ORDER` are spliced in.

use crate::entity::{generated_columns, Column, Entity, TableSchema};
use crate::errors::DatabaseError;
use crate::filter::Filter;
use crate::value::SqlValue;
use sqlx::{Postgres, QueryBuilder};

pub type Builder = QueryBuilder<'static, Postgres>;

/// Row offset for a 1-based page: `(page - 1) * page_size`
///
/// No guard is applied; `page < 1` yields a negative offset, which
/// PostgreSQL rejects when the query runs. Overflow wraps.
pub fn offset(page: i64, page_size: i64) -> i64 {
    page.wrapping_sub(1).wrapping_mul(page_size)
}

/// Quote an identifier, keeping `schema.table` qualification
pub fn ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

fn select_from<T: Entity>() -> Builder {
    QueryBuilder::new(format!("SELECT * FROM {}", ident(T::TABLE)))
}

fn push_where(builder: &mut Builder, filter: &Filter) -> Result<(), DatabaseError> {
    builder.push(" WHERE ");
    filter.push_to(builder)
}

fn push_default_order<T: Entity>(builder: &mut Builder) {
    if let Some(order) = T::DEFAULT_ORDER {
        builder.push(" ORDER BY ");
        builder.push(order);
    }
}

fn push_first<T: Entity>(builder: &mut Builder) {
    builder.push(format!(" ORDER BY {} LIMIT 1", ident(T::PRIMARY_KEY)));
}

fn push_page(builder: &mut Builder, page: i64, page_size: i64) {
    builder.push(" LIMIT ");
    builder.push_bind(page_size);
    builder.push(" OFFSET ");
    builder.push_bind(offset(page, page_size));
}

/// `SELECT *` over the whole table
pub fn select_all<T: Entity>() -> Builder {
    let mut builder = select_from::<T>();
    push_default_order::<T>(&mut builder);
    builder
}

/// First row whose primary key equals `id`
pub fn select_by_id<T: Entity>(id: SqlValue) -> Builder {
    let mut builder = select_from::<T>();
    builder.push(format!(" WHERE {} = ", ident(T::PRIMARY_KEY)));
    id.push_bind(&mut builder);
    push_first::<T>(&mut builder);
    builder
}

pub fn select_where<T: Entity>(filter: &Filter) -> Result<Builder, DatabaseError> {
    let mut builder = select_from::<T>();
    push_where(&mut builder, filter)?;
    push_default_order::<T>(&mut builder);
    Ok(builder)
}

/// First row, by primary key, matching `filter`
pub fn select_one_where<T: Entity>(filter: &Filter) -> Result<Builder, DatabaseError> {
    let mut builder = select_from::<T>();
    push_where(&mut builder, filter)?;
    push_first::<T>(&mut builder);
    Ok(builder)
}

/// Columns to write on insert: generated columns are left to the database
/// while they hold NULL
fn insert_values<T: Entity>(model: &T) -> Vec<(&'static str, SqlValue)> {
    let generated = generated_columns::<T>();
    model
        .values()
        .into_iter()
        .filter(|(name, value)| !(value.is_null() && generated.contains(name)))
        .collect()
}

fn push_insert(builder: &mut Builder, values: Vec<(&'static str, SqlValue)>) {
    if values.is_empty() {
        builder.push(" DEFAULT VALUES");
        return;
    }

    let names: Vec<String> = values.iter().map(|(name, _)| ident(name)).collect();
    builder.push(format!(" ({}) VALUES (", names.join(", ")));
    for (i, (_, value)) in values.into_iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        value.push_bind(builder);
    }
    builder.push(")");
}

/// `INSERT .. RETURNING *`
pub fn insert<T: Entity>(model: &T) -> Builder {
    let mut builder = QueryBuilder::new(format!("INSERT INTO {}", ident(T::TABLE)));
    push_insert(&mut builder, insert_values(model));
    builder.push(" RETURNING *");
    builder
}

/// Insert-or-replace keyed on the primary key, returning the stored row
///
/// A record without a primary key is a plain insert.
pub fn upsert<T: Entity>(model: &T) -> Builder {
    if model.primary_key().is_null() {
        return insert(model);
    }

    let values = insert_values(model);
    let pk = ident(T::PRIMARY_KEY);
    let assignments: Vec<String> = values
        .iter()
        .filter(|(name, _)| *name != T::PRIMARY_KEY)
        .map(|(name, _)| {
            let col = ident(name);
            format!("{} = EXCLUDED.{}", col, col)
        })
        .collect();

    let mut builder = QueryBuilder::new(format!("INSERT INTO {}", ident(T::TABLE)));
    push_insert(&mut builder, values);
    builder.push(format!(" ON CONFLICT ({}) DO UPDATE SET ", pk));
    if assignments.is_empty() {
        // Keeps RETURNING populated when the key is the only column
        builder.push(format!("{} = EXCLUDED.{}", pk, pk));
    } else {
        builder.push(assignments.join(", "));
    }
    builder.push(" RETURNING *");
    builder
}

/// `DELETE` of the record's own row
///
/// # Errors
/// A record without a primary key would match nothing meaningful and is
/// rejected with `DatabaseError::InvalidFilter`.
pub fn delete_by_pk<T: Entity>(model: &T) -> Result<Builder, DatabaseError> {
    let pk_value = model.primary_key();
    if pk_value.is_null() {
        return Err(DatabaseError::InvalidFilter(format!(
            "cannot delete from {} without a primary key",
            T::TABLE
        )));
    }

    let mut builder = QueryBuilder::new(format!(
        "DELETE FROM {} WHERE {} = ",
        ident(T::TABLE),
        ident(T::PRIMARY_KEY)
    ));
    pk_value.push_bind(&mut builder);
    Ok(builder)
}

pub fn delete_where<T: Entity>(filter: &Filter) -> Result<Builder, DatabaseError> {
    let mut builder = QueryBuilder::new(format!("DELETE FROM {}", ident(T::TABLE)));
    push_where(&mut builder, filter)?;
    Ok(builder)
}

/// `SELECT COUNT(*)`, filtered when a predicate is given
///
/// Each call renders into a fresh builder, so a filter never leaks into a
/// later count.
pub fn count<T: Entity>(filter: Option<&Filter>) -> Result<Builder, DatabaseError> {
    let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", ident(T::TABLE)));
    if let Some(filter) = filter {
        push_where(&mut builder, filter)?;
    }
    Ok(builder)
}

/// One page of rows, filtered when a predicate is given
pub fn paginate<T: Entity>(
    page: i64,
    page_size: i64,
    filter: Option<&Filter>,
) -> Result<Builder, DatabaseError> {
    let mut builder = select_from::<T>();
    if let Some(filter) = filter {
        push_where(&mut builder, filter)?;
    }
    push_default_order::<T>(&mut builder);
    push_page(&mut builder, page, page_size);
    Ok(builder)
}

fn column_definition(column: &Column) -> String {
    let mut def = format!("{} {}", ident(column.name), column.column_type);
    if column.primary_key {
        def.push_str(" PRIMARY KEY");
    } else {
        if column.not_null {
            def.push_str(" NOT NULL");
        }
        if column.unique {
            def.push_str(" UNIQUE");
        }
    }
    if let Some(default) = column.default {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    if let Some(target) = column.references {
        def.push_str(" REFERENCES ");
        def.push_str(target);
    }
    def
}

/// `CREATE TABLE IF NOT EXISTS` with every column
pub fn create_table(schema: &TableSchema) -> String {
    let columns: Vec<String> = schema.columns.iter().map(column_definition).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        ident(schema.table),
        columns.join(", ")
    )
}

/// One `ADD COLUMN IF NOT EXISTS` per non-key column
///
/// Existing columns are never altered or dropped.
pub fn add_columns(schema: &TableSchema) -> Vec<String> {
    schema
        .columns
        .iter()
        .filter(|c| !c.primary_key)
        .map(|c| {
            format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
                ident(schema.table),
                column_definition(c)
            )
        })
        .collect()
}

pub fn create_indexes(schema: &TableSchema) -> Vec<String> {
    let table_slug = schema.table.replace('.', "_");
    schema
        .columns
        .iter()
        .filter(|c| c.index)
        .map(|c| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                ident(&format!("idx_{}_{}", table_slug, c.name)),
                ident(schema.table),
                ident(c.name)
            )
        })
        .collect()
}

/// All statements auto-migration runs for one table, in order
pub fn migration_statements(schema: &TableSchema) -> Vec<String> {
    let mut statements = vec![create_table(schema)];
    statements.extend(add_columns(schema));
    statements.extend(create_indexes(schema));
    statements
}
