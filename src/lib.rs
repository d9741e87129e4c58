//! Composable PostgreSQL statements compiled to `$N` placeholders, run
//! through an instrumented engine, plus a listing proxy for paged grids.

pub mod ast;
pub mod config;
pub mod db;
pub mod error;
pub mod proxy;
pub mod types;

#[cfg(test)]
mod testing;

pub use ast::{compile, render_sql, Compiled, Statement};
pub use config::EngineConfig;
pub use db::{CallOptions, Connection, Executor, Params, Record, Session};
pub use error::{CompileError, Error, Result};
pub use proxy::{ListingEnvelope, ListingProxy, ListingRequest};
pub use types::{Interval, NamedArgs, Range, Value};
