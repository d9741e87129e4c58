//! The instrumented execution engine.
//!
//! Every operation compiles its statement, runs it through a [`Connection`]
//! and reports on it. With verbose logging the statement is logged at DEBUG
//! before it runs and its timing afterwards, at WARN when the call was slow.
//! Without it nothing is logged unless the call was slow (one WARN record
//! carrying the statement) or failed (one ERROR record carrying the
//! statement and the failure).

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use super::diagnostics::Diagnostic;
use super::driver::{Connection, RowCursor};
use super::instrument::{indent, substitute_args, Operation};
use crate::ast::{compile, render_sql, Compiled, SqlLayout, Statement};
use crate::config::EngineConfig;
use crate::error::{DriverError, Error, InstrumentationError, Result};
use crate::types::{NamedArgs, Value};

/// Arguments of a call: positional ones for raw statements, named ones for
/// bind parameters of composed statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct Params<'a> {
    pub positional: &'a [Value],
    pub named: Option<&'a NamedArgs>,
}

impl<'a> Params<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn positional(args: &'a [Value]) -> Self {
        Self {
            positional: args,
            named: None,
        }
    }

    pub fn named(args: &'a NamedArgs) -> Self {
        Self {
            positional: &[],
            named: Some(args),
        }
    }
}

/// Per-call settings.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the configured slow query threshold.
    pub slow_query_threshold: Option<Duration>,
    /// Status `execute` must return, e.g. `UPDATE 1`.
    pub expected_result: Option<String>,
    /// Column read by `fetch_scalar`.
    pub column: usize,
}

impl CallOptions {
    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn expect(mut self, status: impl Into<String>) -> Self {
        self.expected_result = Some(status.into());
        self
    }

    pub fn column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }
}

struct Call<'a> {
    operation: Operation,
    statement: &'a Statement,
    named: Option<&'a NamedArgs>,
    compiled: &'a Compiled,
    options: &'a CallOptions,
    transaction: String,
}

#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: EngineConfig,
}

impl Executor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bind this executor to a connection.
    pub fn session<'c, C: Connection>(&'c self, conn: &'c C) -> Session<'c, C> {
        Session {
            executor: self,
            conn,
        }
    }

    /// Run a statement and return its command status. Fails with
    /// [`Error::UnexpectedResult`] when `options.expected_result` is set and
    /// differs from the status.
    pub async fn execute<C: Connection>(
        &self,
        conn: &C,
        statement: &Statement,
        params: Params<'_>,
        options: &CallOptions,
    ) -> Result<String> {
        let compiled = compile(statement, params.positional, params.named)?;
        let call = self.call(conn, Operation::Execute, statement, params, &compiled, options);
        let status = self
            .run(call, |_| None, conn.execute(&compiled.sql, &compiled.args))
            .await?;
        match &options.expected_result {
            Some(expected) if *expected != status => Err(Error::UnexpectedResult {
                expected: expected.clone(),
                actual: status,
            }),
            _ => Ok(status),
        }
    }

    /// Prepare a statement. Arguments are not resolved at this stage, the
    /// prepared statement takes them when it runs.
    pub async fn prepare<C: Connection>(
        &self,
        conn: &C,
        statement: &Statement,
        options: &CallOptions,
    ) -> Result<C::Prepared> {
        let compiled = Compiled {
            sql: render_sql(statement, SqlLayout::Compact, None)?,
            args: Vec::new(),
        };
        let call = self.call(conn, Operation::Prepare, statement, Params::none(), &compiled, options);
        self.run(call, |_| None, conn.prepare(&compiled.sql)).await
    }

    pub async fn fetch_all<C: Connection>(
        &self,
        conn: &C,
        statement: &Statement,
        params: Params<'_>,
        options: &CallOptions,
    ) -> Result<Vec<C::Row>> {
        let compiled = compile(statement, params.positional, params.named)?;
        let call = self.call(conn, Operation::FetchAll, statement, params, &compiled, options);
        self.run(call, |rows: &Vec<C::Row>| Some(rows.len()), conn.fetch(&compiled.sql, &compiled.args))
            .await
    }

    /// First row of the result, or `None` when there is none.
    pub async fn fetch_one<C: Connection>(
        &self,
        conn: &C,
        statement: &Statement,
        params: Params<'_>,
        options: &CallOptions,
    ) -> Result<Option<C::Row>> {
        let compiled = compile(statement, params.positional, params.named)?;
        let call = self.call(conn, Operation::FetchOne, statement, params, &compiled, options);
        self.run(
            call,
            |row: &Option<C::Row>| Some(usize::from(row.is_some())),
            conn.fetch_one(&compiled.sql, &compiled.args),
        )
        .await
    }

    /// Value of column `options.column` of the first row.
    ///
    /// `None` both when there is no row and when the value is NULL; use
    /// [`Executor::fetch_one`] to tell the two apart.
    pub async fn fetch_scalar<C: Connection>(
        &self,
        conn: &C,
        statement: &Statement,
        params: Params<'_>,
        options: &CallOptions,
    ) -> Result<Option<Value>> {
        let compiled = compile(statement, params.positional, params.named)?;
        let call = self.call(conn, Operation::FetchScalar, statement, params, &compiled, options);
        self.run(
            call,
            |_| None,
            conn.fetch_scalar(&compiled.sql, &compiled.args, options.column),
        )
        .await
    }

    /// Start the statement and stream its rows. The timing covers opening
    /// the cursor; rows are read by the caller afterwards.
    pub async fn cursor<C: Connection>(
        &self,
        conn: &C,
        statement: &Statement,
        params: Params<'_>,
        options: &CallOptions,
    ) -> Result<RowCursor<C::Row>> {
        let compiled = compile(statement, params.positional, params.named)?;
        let call = self.call(conn, Operation::Cursor, statement, params, &compiled, options);
        self.run(call, |_| None, conn.cursor(&compiled.sql, &compiled.args))
            .await
    }

    fn call<'a, C: Connection>(
        &self,
        conn: &C,
        operation: Operation,
        statement: &'a Statement,
        params: Params<'a>,
        compiled: &'a Compiled,
        options: &'a CallOptions,
    ) -> Call<'a> {
        Call {
            operation,
            statement,
            named: params.named,
            compiled,
            options,
            transaction: conn.transaction_token(),
        }
    }

    async fn run<T, F>(&self, call: Call<'_>, fetched: impl Fn(&T) -> Option<usize>, driver_call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, DriverError>>,
    {
        let verbose = self.config.is_verbose();
        let threshold = call
            .options
            .slow_query_threshold
            .unwrap_or_else(|| self.config.slow_query_threshold());

        if verbose {
            debug!(
                operation = %call.operation,
                transaction = %call.transaction,
                "{} in transaction {}:\n{}",
                call.operation.verb(),
                call.transaction,
                self.render(&call)
            );
        }

        let started = Instant::now();
        let result = driver_call.await;
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                let timing = call.operation.timing_message(fetched(&value), elapsed);
                if elapsed >= threshold {
                    if verbose {
                        warn!(
                            operation = %call.operation,
                            transaction = %call.transaction,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Slow query: {}",
                            timing
                        );
                    } else {
                        warn!(
                            operation = %call.operation,
                            transaction = %call.transaction,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Slow query: {} in transaction {}:\n{}\n{}",
                            call.operation.verb(),
                            call.transaction,
                            self.render(&call),
                            timing
                        );
                    }
                } else if verbose {
                    debug!(
                        operation = %call.operation,
                        transaction = %call.transaction,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "{}",
                        timing
                    );
                }
                Ok(value)
            }
            Err(err) => {
                if !verbose {
                    let diagnostic = Diagnostic::from_driver_error(err.as_ref(), &call.compiled.sql);
                    error!(
                        operation = %call.operation,
                        transaction = %call.transaction,
                        category = %diagnostic.category,
                        code = %diagnostic.code,
                        diagnostic = %diagnostic.display_full(),
                        "Error \"{}\" {} in transaction {}:\n{}",
                        err,
                        call.operation.verb().to_lowercase(),
                        call.transaction,
                        self.render(&call)
                    );
                }
                Err(Error::Driver(err))
            }
        }
    }

    /// The statement with its arguments inlined, indented for a log record.
    /// Rendering problems are logged and the compiled text is used instead.
    fn render(&self, call: &Call<'_>) -> String {
        match self.try_render(call) {
            Ok(rendered) => rendered,
            Err(err) => {
                error!(operation = %call.operation, "{}", err);
                indent(&call.compiled.sql)
            }
        }
    }

    fn try_render(&self, call: &Call<'_>) -> std::result::Result<String, InstrumentationError> {
        let sql = if self.config.pretty_sql {
            render_sql(call.statement, SqlLayout::Pretty, call.named)
                .map_err(|err| InstrumentationError(err.to_string()))?
        } else {
            call.compiled.sql.clone()
        };
        Ok(indent(&substitute_args(&sql, &call.compiled.args)?))
    }
}

/// An executor bound to one connection.
pub struct Session<'c, C: Connection> {
    executor: &'c Executor,
    conn: &'c C,
}

impl<'c, C: Connection> Session<'c, C> {
    pub fn connection(&self) -> &'c C {
        self.conn
    }

    pub async fn execute(&self, statement: &Statement, params: Params<'_>) -> Result<String> {
        self.executor
            .execute(self.conn, statement, params, &CallOptions::default())
            .await
    }

    /// Execute and check the returned status.
    pub async fn execute_expecting(
        &self,
        statement: &Statement,
        params: Params<'_>,
        expected: &str,
    ) -> Result<String> {
        let options = CallOptions::default().expect(expected);
        self.executor.execute(self.conn, statement, params, &options).await
    }

    pub async fn prepare(&self, statement: &Statement) -> Result<C::Prepared> {
        self.executor
            .prepare(self.conn, statement, &CallOptions::default())
            .await
    }

    pub async fn fetch_all(&self, statement: &Statement, params: Params<'_>) -> Result<Vec<C::Row>> {
        self.executor
            .fetch_all(self.conn, statement, params, &CallOptions::default())
            .await
    }

    pub async fn fetch_one(&self, statement: &Statement, params: Params<'_>) -> Result<Option<C::Row>> {
        self.executor
            .fetch_one(self.conn, statement, params, &CallOptions::default())
            .await
    }

    pub async fn fetch_scalar(&self, statement: &Statement, params: Params<'_>) -> Result<Option<Value>> {
        self.executor
            .fetch_scalar(self.conn, statement, params, &CallOptions::default())
            .await
    }

    pub async fn cursor(&self, statement: &Statement, params: Params<'_>) -> Result<RowCursor<C::Row>> {
        self.executor
            .cursor(self.conn, statement, params, &CallOptions::default())
            .await
    }
}
