use std::error::Error as StdError;
use std::fmt;

use crate::error::Error;

/// Broad class of a database failure, from its SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE 42601, 42000)
    Syntax,
    /// Missing table/column, ambiguous reference, privileges
    Semantic,
    /// Data exceptions, constraint violations, resource limits
    Execution,
    /// Invalid transaction state, serialization failures, deadlocks
    Transaction,
    Connection,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

/// What the server reported about a failed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub category: ErrorCategory,
    /// SQLSTATE, empty for failures that never reached the server
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub constraint: Option<String>,
    /// 1-based line and column of the reported position in the statement
    pub line: Option<usize>,
    pub col: Option<usize>,
}

impl Diagnostic {
    /// Describe a driver failure of `sql`. Compilation and result errors
    /// have no diagnostic.
    pub fn from_error(err: &Error, sql: &str) -> Option<Self> {
        err.as_driver_error().map(|err| Self::from_driver_error(err, sql))
    }

    pub fn from_driver_error(err: &(dyn StdError + Send + Sync + 'static), sql: &str) -> Self {
        let pg = err.downcast_ref::<tokio_postgres::Error>();
        if let Some(db) = pg.and_then(tokio_postgres::Error::as_db_error) {
            let code = db.code().code().to_string();
            let position = db.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let (line, col) = match position {
                Some(pos) => byte_offset_to_line_col(sql, pos),
                None => (None, None),
            };
            return Diagnostic {
                category: categorize_sqlstate(&code),
                code,
                message: db.message().to_string(),
                detail: db.detail().map(str::to_string),
                hint: db.hint().map(str::to_string),
                table: db.table().map(str::to_string),
                column: db.column().map(str::to_string),
                constraint: db.constraint().map(str::to_string),
                line,
                col,
            };
        }

        let category = match pg {
            Some(pg) if pg.is_closed() || pg.source().is_some() => ErrorCategory::Connection,
            _ => ErrorCategory::Unknown,
        };
        Diagnostic {
            category,
            code: String::new(),
            message: err.to_string(),
            detail: err.source().map(|e| e.to_string()),
            hint: None,
            table: None,
            column: None,
            constraint: None,
            line: None,
            col: None,
        }
    }

    /// Multi-line description for error log records.
    pub fn display_full(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.category, self.message)];
        if let (Some(line), Some(col)) = (self.line, self.col) {
            lines.push(format!("  at line {}, column {}", line, col));
        }
        if !self.code.is_empty() {
            lines.push(format!("  SQLSTATE: {}", self.code));
        }
        if let Some(detail) = &self.detail {
            lines.push(format!("  Detail: {}", detail));
        }
        if let Some(hint) = &self.hint {
            lines.push(format!("  Hint: {}", hint));
        }
        match (&self.table, &self.column) {
            (Some(table), Some(column)) => lines.push(format!("  Column: {}.{}", table, column)),
            (Some(table), None) => lines.push(format!("  Table: {}", table)),
            _ => {}
        }
        if let Some(constraint) = &self.constraint {
            lines.push(format!("  Constraint: {}", constraint));
        }
        lines.join("\n")
    }
}

/// Convert a 1-based byte offset in a statement to 1-based (line, column).
fn byte_offset_to_line_col(sql: &str, byte_pos: usize) -> (Option<usize>, Option<usize>) {
    if byte_pos == 0 || sql.is_empty() {
        return (Some(1), Some(1));
    }
    let target = (byte_pos - 1).min(sql.len());
    let mut line = 1usize;
    let mut col = 1usize;
    for (i, ch) in sql.char_indices() {
        if i >= target {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (Some(line), Some(col))
}

pub fn categorize_sqlstate(code: &str) -> ErrorCategory {
    let Some(class) = code.get(..2) else {
        return ErrorCategory::Unknown;
    };
    match class {
        "42" if code == "42601" || code == "42000" => ErrorCategory::Syntax,
        "42" => ErrorCategory::Semantic,
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        // 40001 serialization_failure, 40P01 deadlock_detected
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}
