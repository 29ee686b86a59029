// Generic repository over any mapped entity type

use super::pool::Database;
use crate::entity::Entity;
use crate::errors::DatabaseError;
use crate::filter::Filter;
use crate::value::SqlValue;
use std::marker::PhantomData;
use tracing::instrument;

/// Data access for one entity type
///
/// Holds a clone of the shared [`Database`] handle and nothing else, so
/// repositories can be created and dropped freely. Every method issues
/// exactly one statement.
pub struct Repository<T> {
    db: Database,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    /// Create a new repository for `T`
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn log_errors(&self) -> bool {
        self.db.log_level().logs_errors()
    }

    /// Insert `model`, then refresh it from the stored row
    ///
    /// Generated columns (serial keys, database defaults marked as generated)
    /// are populated in place.
    #[instrument(skip(self, model), fields(table = T::TABLE))]
    pub async fn create(&self, model: &mut T) -> Result<(), DatabaseError> {
        ops::create(self.db.pool(), model, self.log_errors()).await
    }

    /// Load the record with primary key `id`
    ///
    /// # Errors
    /// `DatabaseError::NotFound` when no row has that key.
    #[instrument(skip(self, id), fields(table = T::TABLE))]
    pub async fn find_by_id(&self, id: impl Into<SqlValue>) -> Result<T, DatabaseError> {
        ops::find_by_id(self.db.pool(), id.into(), self.log_errors()).await
    }

    /// Load every record; order follows `T::DEFAULT_ORDER`, otherwise the database's
    #[instrument(skip(self), fields(table = T::TABLE))]
    pub async fn find_all(&self) -> Result<Vec<T>, DatabaseError> {
        ops::find_all(self.db.pool(), self.log_errors()).await
    }

    #[instrument(skip(self, filter), fields(table = T::TABLE, filter = filter.expr()))]
    pub async fn find_where(&self, filter: &Filter) -> Result<Vec<T>, DatabaseError> {
        ops::find_where(self.db.pool(), filter, self.log_errors()).await
    }

    /// First record, by primary key, matching `filter`
    ///
    /// # Errors
    /// `DatabaseError::NotFound` when nothing matches.
    #[instrument(skip(self, filter), fields(table = T::TABLE, filter = filter.expr()))]
    pub async fn find_one(&self, filter: &Filter) -> Result<T, DatabaseError> {
        ops::find_one(self.db.pool(), filter, self.log_errors()).await
    }

    /// Save every field of `model`
    ///
    /// Inserts when the primary key is unset or not yet stored, otherwise
    /// overwrites the stored row. `model` is refreshed from the result.
    #[instrument(skip(self, model), fields(table = T::TABLE))]
    pub async fn update(&self, model: &mut T) -> Result<(), DatabaseError> {
        ops::update(self.db.pool(), model, self.log_errors()).await
    }

    /// Delete the row with `model`'s primary key, returning rows removed
    #[instrument(skip(self, model), fields(table = T::TABLE))]
    pub async fn delete(&self, model: &T) -> Result<u64, DatabaseError> {
        ops::delete(self.db.pool(), model, self.log_errors()).await
    }

    /// Delete every row matching `filter` in one statement
    #[instrument(skip(self, filter), fields(table = T::TABLE, filter = filter.expr()))]
    pub async fn delete_where(&self, filter: &Filter) -> Result<u64, DatabaseError> {
        ops::delete_where::<T, _>(self.db.pool(), filter, self.log_errors()).await
    }

    /// Count rows, filtered when `filter` is given
    #[instrument(skip(self), fields(table = T::TABLE))]
    pub async fn count(&self, filter: Option<&Filter>) -> Result<i64, DatabaseError> {
        ops::count::<T, _>(self.db.pool(), filter, self.log_errors()).await
    }

    /// Load one page; `page` is 1-based
    ///
    /// The offset is `(page - 1) * page_size` with no guard: `page < 1` is
    /// rejected by the database as a negative offset.
    #[instrument(skip(self), fields(table = T::TABLE))]
    pub async fn paginate(&self, page: i64, page_size: i64) -> Result<Vec<T>, DatabaseError> {
        ops::paginate(self.db.pool(), page, page_size, None, self.log_errors()).await
    }

    /// Like [`Repository::paginate`], applying `filter` before paging
    #[instrument(skip(self, filter), fields(table = T::TABLE, filter = filter.expr()))]
    pub async fn paginate_where(
        &self,
        page: i64,
        page_size: i64,
        filter: &Filter,
    ) -> Result<Vec<T>, DatabaseError> {
        ops::paginate(self.db.pool(), page, page_size, Some(filter), self.log_errors()).await
    }
}

/// Statement execution shared by pool- and transaction-backed repositories
pub(crate) mod ops {
    use crate::entity::Entity;
    use crate::errors::DatabaseError;
    use crate::filter::Filter;
    use crate::sql;
    use crate::telemetry;
    use crate::value::SqlValue;
    use sqlx::{Executor, Postgres};
    use std::time::Instant;

    /// Record metrics for a finished statement and map its error
    fn finish<T: Entity, R>(
        operation: &'static str,
        started: Instant,
        result: Result<R, sqlx::Error>,
        log_errors: bool,
    ) -> Result<R, DatabaseError> {
        telemetry::record_query(operation, T::TABLE, started.elapsed(), result.is_ok());

        result.map_err(|e| {
            let err = DatabaseError::from(e);
            if log_errors {
                tracing::error!(operation, table = T::TABLE, error = %err, "Statement failed");
            }
            err
        })
    }

    fn not_found<T: Entity>(what: impl std::fmt::Display) -> DatabaseError {
        DatabaseError::NotFound(format!("{} {}", T::TABLE, what))
    }

    pub async fn create<'e, T, E>(
        executor: E,
        model: &mut T,
        log_errors: bool,
    ) -> Result<(), DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::insert(model);
        let started = Instant::now();
        let result = builder.build_query_as::<T>().fetch_one(executor).await;
        *model = finish::<T, _>("create", started, result, log_errors)?;

        tracing::info!(table = T::TABLE, "Record created");
        Ok(())
    }

    pub async fn find_by_id<'e, T, E>(
        executor: E,
        id: SqlValue,
        log_errors: bool,
    ) -> Result<T, DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::select_by_id::<T>(id.clone());
        let started = Instant::now();
        let result = builder.build_query_as::<T>().fetch_optional(executor).await;

        finish::<T, _>("find_by_id", started, result, log_errors)?
            .ok_or_else(|| not_found::<T>(format_args!("with {} = {:?}", T::PRIMARY_KEY, id)))
    }

    pub async fn find_all<'e, T, E>(executor: E, log_errors: bool) -> Result<Vec<T>, DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::select_all::<T>();
        let started = Instant::now();
        let result = builder.build_query_as::<T>().fetch_all(executor).await;
        let rows = finish::<T, _>("find_all", started, result, log_errors)?;

        tracing::debug!(table = T::TABLE, count = rows.len(), "Loaded all records");
        Ok(rows)
    }

    pub async fn find_where<'e, T, E>(
        executor: E,
        filter: &Filter,
        log_errors: bool,
    ) -> Result<Vec<T>, DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::select_where::<T>(filter)?;
        let started = Instant::now();
        let result = builder.build_query_as::<T>().fetch_all(executor).await;
        let rows = finish::<T, _>("find_where", started, result, log_errors)?;

        tracing::debug!(table = T::TABLE, count = rows.len(), "Loaded matching records");
        Ok(rows)
    }

    pub async fn find_one<'e, T, E>(
        executor: E,
        filter: &Filter,
        log_errors: bool,
    ) -> Result<T, DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::select_one_where::<T>(filter)?;
        let started = Instant::now();
        let result = builder.build_query_as::<T>().fetch_optional(executor).await;

        finish::<T, _>("find_one", started, result, log_errors)?
            .ok_or_else(|| not_found::<T>(format_args!("matching '{}'", filter.expr())))
    }

    pub async fn update<'e, T, E>(
        executor: E,
        model: &mut T,
        log_errors: bool,
    ) -> Result<(), DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::upsert(model);
        let started = Instant::now();
        let result = builder.build_query_as::<T>().fetch_one(executor).await;
        *model = finish::<T, _>("update", started, result, log_errors)?;

        tracing::info!(table = T::TABLE, "Record saved");
        Ok(())
    }

    pub async fn delete<'e, T, E>(executor: E, model: &T, log_errors: bool) -> Result<u64, DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::delete_by_pk(model)?;
        let started = Instant::now();
        let result = builder.build().execute(executor).await;
        let deleted = finish::<T, _>("delete", started, result, log_errors)?.rows_affected();

        tracing::info!(table = T::TABLE, deleted, "Record deleted");
        Ok(deleted)
    }

    pub async fn delete_where<'e, T, E>(
        executor: E,
        filter: &Filter,
        log_errors: bool,
    ) -> Result<u64, DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::delete_where::<T>(filter)?;
        let started = Instant::now();
        let result = builder.build().execute(executor).await;
        let deleted = finish::<T, _>("delete_where", started, result, log_errors)?.rows_affected();

        tracing::info!(table = T::TABLE, deleted, "Matching records deleted");
        Ok(deleted)
    }

    pub async fn count<'e, T, E>(
        executor: E,
        filter: Option<&Filter>,
        log_errors: bool,
    ) -> Result<i64, DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::count::<T>(filter)?;
        let started = Instant::now();
        let result = builder.build_query_scalar::<i64>().fetch_one(executor).await;
        finish::<T, _>("count", started, result, log_errors)
    }

    pub async fn paginate<'e, T, E>(
        executor: E,
        page: i64,
        page_size: i64,
        filter: Option<&Filter>,
        log_errors: bool,
    ) -> Result<Vec<T>, DatabaseError>
    where
        T: Entity,
        E: Executor<'e, Database = Postgres>,
    {
        let mut builder = sql::paginate::<T>(page, page_size, filter)?;
        let started = Instant::now();
        let result = builder.build_query_as::<T>().fetch_all(executor).await;
        let rows = finish::<T, _>("paginate", started, result, log_errors)?;

        tracing::debug!(
            table = T::TABLE,
            page,
            page_size,
            count = rows.len(),
            "Loaded page"
        );
        Ok(rows)
    }
}
