/// Statement composition and compilation.
///
/// ```text
/// Table / Column descriptions   (table.rs)
///       ↓
/// Statement tree                (types.rs)
///       ↓
/// Compiler → $N SQL + args      (compiler.rs, formatter.rs)
///       ↓
/// Client-side defaults          (defaults.rs)
///       ↓
/// Execution engine              (db/ module)
/// ```
pub mod compiler;
pub mod defaults;
pub mod formatter;
pub mod table;
pub mod types;

pub use compiler::{compile, render_sql, Compiled};
pub use defaults::{inject_defaults, DefaultRule};
pub use formatter::{quote_ident, SqlLayout};
pub use table::{Column, Table, TableBuilder, ValueProducer};
pub use types::*;
