// Transaction scope handed to `Database::with_transaction` callbacks

use super::repository::ops;
use crate::config::LogLevel;
use crate::entity::Entity;
use crate::errors::DatabaseError;
use crate::filter::Filter;
use crate::value::SqlValue;
use sqlx::postgres::{PgConnection, Postgres};
use sqlx::Transaction;
use std::marker::PhantomData;
use tracing::instrument;

/// Map begin/commit/rollback failures, keeping connection problems visible
pub(crate) fn transaction_error(err: sqlx::Error) -> DatabaseError {
    match DatabaseError::from(err) {
        DatabaseError::QueryFailed(e) => DatabaseError::TransactionFailed(e),
        other => other,
    }
}

/// An open transaction
///
/// Statements issued through [`Tx::conn`] or [`Tx::repository`] become
/// visible to other sessions only once the surrounding
/// `with_transaction` call commits.
pub struct Tx {
    inner: Transaction<'static, Postgres>,
    log_level: LogLevel,
}

impl Tx {
    pub(crate) fn new(inner: Transaction<'static, Postgres>, log_level: LogLevel) -> Self {
        Self { inner, log_level }
    }

    /// Connection bound to this transaction, for ad-hoc statements
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.inner
    }

    /// Repository operations for `T` running inside this transaction
    pub fn repository<T: Entity>(&mut self) -> TxRepository<'_, T> {
        TxRepository {
            conn: &mut self.inner,
            log_errors: self.log_level.logs_errors(),
            _entity: PhantomData,
        }
    }

    pub(crate) async fn commit(self) -> Result<(), DatabaseError> {
        self.inner.commit().await.map_err(transaction_error)
    }

    pub(crate) async fn rollback(self) -> Result<(), DatabaseError> {
        self.inner.rollback().await.map_err(transaction_error)
    }
}

/// [`Repository`](super::Repository) operations bound to an open transaction
///
/// Same statements and error mapping as the pool-backed repository.
pub struct TxRepository<'t, T> {
    conn: &'t mut PgConnection,
    log_errors: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<'t, T: Entity> TxRepository<'t, T> {
    #[instrument(skip(self, model), fields(table = T::TABLE))]
    pub async fn create(&mut self, model: &mut T) -> Result<(), DatabaseError> {
        ops::create(&mut *self.conn, model, self.log_errors).await
    }

    #[instrument(skip(self, id), fields(table = T::TABLE))]
    pub async fn find_by_id(&mut self, id: impl Into<SqlValue>) -> Result<T, DatabaseError> {
        ops::find_by_id(&mut *self.conn, id.into(), self.log_errors).await
    }

    #[instrument(skip(self), fields(table = T::TABLE))]
    pub async fn find_all(&mut self) -> Result<Vec<T>, DatabaseError> {
        ops::find_all(&mut *self.conn, self.log_errors).await
    }

    #[instrument(skip(self, filter), fields(table = T::TABLE, filter = filter.expr()))]
    pub async fn find_where(&mut self, filter: &Filter) -> Result<Vec<T>, DatabaseError> {
        ops::find_where(&mut *self.conn, filter, self.log_errors).await
    }

    #[instrument(skip(self, filter), fields(table = T::TABLE, filter = filter.expr()))]
    pub async fn find_one(&mut self, filter: &Filter) -> Result<T, DatabaseError> {
        ops::find_one(&mut *self.conn, filter, self.log_errors).await
    }

    #[instrument(skip(self, model), fields(table = T::TABLE))]
    pub async fn update(&mut self, model: &mut T) -> Result<(), DatabaseError> {
        ops::update(&mut *self.conn, model, self.log_errors).await
    }

    #[instrument(skip(self, model), fields(table = T::TABLE))]
    pub async fn delete(&mut self, model: &T) -> Result<u64, DatabaseError> {
        ops::delete(&mut *self.conn, model, self.log_errors).await
    }

    #[instrument(skip(self, filter), fields(table = T::TABLE, filter = filter.expr()))]
    pub async fn delete_where(&mut self, filter: &Filter) -> Result<u64, DatabaseError> {
        ops::delete_where::<T, _>(&mut *self.conn, filter, self.log_errors).await
    }

    #[instrument(skip(self), fields(table = T::TABLE))]
    pub async fn count(&mut self, filter: Option<&Filter>) -> Result<i64, DatabaseError> {
        ops::count::<T, _>(&mut *self.conn, filter, self.log_errors).await
    }

    #[instrument(skip(self), fields(table = T::TABLE))]
    pub async fn paginate(&mut self, page: i64, page_size: i64) -> Result<Vec<T>, DatabaseError> {
        ops::paginate(&mut *self.conn, page, page_size, None, self.log_errors).await
    }

    #[instrument(skip(self, filter), fields(table = T::TABLE, filter = filter.expr()))]
    pub async fn paginate_where(
        &mut self,
        page: i64,
        page_size: i64,
        filter: &Filter,
    ) -> Result<Vec<T>, DatabaseError> {
        ops::paginate(&mut *self.conn, page, page_size, Some(filter), self.log_errors).await
    }
}
