//! The connection seam between the engine and the PostgreSQL driver.
//!
//! The engine only ever talks to a [`Connection`]; tokio-postgres clients,
//! transactions and pooled deadpool objects all implement it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, GenericClient, Row, Transaction};

use crate::error::DriverError;
use crate::types::Value;

/// A row returned by a connection.
pub trait Record {
    fn column_names(&self) -> Vec<String>;

    fn value_at(&self, index: usize) -> Result<Value, DriverError>;

    fn value_of(&self, name: &str) -> Result<Value, DriverError> {
        let index = self
            .column_names()
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| format!("Column {:?} not found in row", name))?;
        self.value_at(index)
    }
}

impl Record for Row {
    fn column_names(&self) -> Vec<String> {
        Row::columns(self)
            .iter()
            .map(|column| column.name().to_string())
            .collect()
    }

    fn value_at(&self, index: usize) -> Result<Value, DriverError> {
        Ok(self.try_get::<_, Value>(index)?)
    }
}

/// Rows of a statement, delivered as the server produces them.
pub type RowCursor<R> = BoxStream<'static, Result<R, DriverError>>;

#[async_trait]
pub trait Connection: Send + Sync {
    type Row: Record + Send + 'static;
    type Prepared: Send;

    /// Run a statement and return its command status, e.g. `INSERT 0 1`.
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<String, DriverError>;

    async fn prepare(&self, sql: &str) -> Result<Self::Prepared, DriverError>;

    async fn fetch(&self, sql: &str, args: &[Value]) -> Result<Vec<Self::Row>, DriverError>;

    /// Start the statement and stream its rows.
    async fn cursor(&self, sql: &str, args: &[Value]) -> Result<RowCursor<Self::Row>, DriverError>;

    /// First row of the result, if any.
    async fn fetch_one(&self, sql: &str, args: &[Value]) -> Result<Option<Self::Row>, DriverError> {
        Ok(self.fetch(sql, args).await?.into_iter().next())
    }

    /// Value of `column` in the first row. A missing row and a NULL value
    /// both yield `None`.
    async fn fetch_scalar(
        &self,
        sql: &str,
        args: &[Value],
        column: usize,
    ) -> Result<Option<Value>, DriverError> {
        match self.fetch_one(sql, args).await? {
            Some(row) => match row.value_at(column)? {
                Value::Null => Ok(None),
                value => Ok(Some(value)),
            },
            None => Ok(None),
        }
    }

    /// Opaque identifier of the transaction context, for log records.
    fn transaction_token(&self) -> String;
}

/// Build the command tag PostgreSQL would report for `sql`, given the
/// number of affected rows.
pub fn command_tag(sql: &str, affected: u64) -> String {
    const MODIFIERS: &[&str] = &[
        "OR", "REPLACE", "TEMP", "TEMPORARY", "UNIQUE", "UNLOGGED", "GLOBAL", "LOCAL",
    ];

    let mut words = sql.split_whitespace().map(str::to_ascii_uppercase);
    let Some(verb) = words.next() else {
        return String::new();
    };
    match verb.as_str() {
        "INSERT" => format!("INSERT 0 {}", affected),
        "UPDATE" | "DELETE" | "SELECT" | "MERGE" | "MOVE" | "FETCH" | "COPY" => {
            format!("{} {}", verb, affected)
        }
        "CREATE" | "DROP" | "ALTER" => match words.find(|w| !MODIFIERS.contains(&w.as_str())) {
            Some(object) => format!("{} {}", verb, object.trim_end_matches(';')),
            None => verb,
        },
        _ => verb.trim_end_matches(';').to_string(),
    }
}

fn params(args: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    args.iter().map(|arg| arg as &(dyn ToSql + Sync)).collect()
}

async fn pg_execute<C: GenericClient + Sync>(client: &C, sql: &str, args: &[Value]) -> Result<String, DriverError> {
    let affected = client.execute(sql, &params(args)).await?;
    Ok(command_tag(sql, affected))
}

async fn pg_fetch<C: GenericClient + Sync>(client: &C, sql: &str, args: &[Value]) -> Result<Vec<Row>, DriverError> {
    Ok(client.query(sql, &params(args)).await?)
}

async fn pg_cursor<C: GenericClient + Sync>(client: &C, sql: &str, args: &[Value]) -> Result<RowCursor<Row>, DriverError> {
    let rows = client.query_raw(sql, params(args)).await?;
    Ok(rows.map_err(DriverError::from).boxed())
}

macro_rules! impl_connection {
    ($($client:ty),* $(,)?) => {
        $(
            #[async_trait]
            impl Connection for $client {
                type Row = Row;
                type Prepared = tokio_postgres::Statement;

                async fn execute(&self, sql: &str, args: &[Value]) -> Result<String, DriverError> {
                    pg_execute(self, sql, args).await
                }

                async fn prepare(&self, sql: &str) -> Result<Self::Prepared, DriverError> {
                    Ok(GenericClient::prepare(self, sql).await?)
                }

                async fn fetch(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, DriverError> {
                    pg_fetch(self, sql, args).await
                }

                async fn cursor(&self, sql: &str, args: &[Value]) -> Result<RowCursor<Row>, DriverError> {
                    pg_cursor(self, sql, args).await
                }

                fn transaction_token(&self) -> String {
                    format!("{:x}", self as *const Self as *const () as usize)
                }
            }
        )*
    };
}

impl_connection!(Client, Transaction<'_>);

#[async_trait]
impl Connection for deadpool_postgres::Object {
    type Row = Row;
    type Prepared = tokio_postgres::Statement;

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<String, DriverError> {
        pg_execute(client(self), sql, args).await
    }

    /// Pooled connections keep a statement cache, so preparing goes through it.
    async fn prepare(&self, sql: &str) -> Result<Self::Prepared, DriverError> {
        Ok(self.prepare_cached(sql).await?)
    }

    async fn fetch(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, DriverError> {
        pg_fetch(client(self), sql, args).await
    }

    async fn cursor(&self, sql: &str, args: &[Value]) -> Result<RowCursor<Row>, DriverError> {
        pg_cursor(client(self), sql, args).await
    }

    fn transaction_token(&self) -> String {
        client(self).transaction_token()
    }
}

fn client(object: &deadpool_postgres::Object) -> &Client {
    object
}
