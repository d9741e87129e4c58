//! Client-side column defaults and on-update values.
//!
//! The compiler adds a bind for every column whose default (on INSERT) or
//! on-update value (on UPDATE) is produced on the client and that the
//! statement does not set explicitly. The injector fills those binds in
//! before the positional arguments are assembled.

use std::collections::HashMap;
use std::sync::Arc;

use super::table::Column;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRule {
    /// Use the column `default` (INSERT).
    Insert,
    /// Use the column `onupdate` value (UPDATE).
    Update,
}

/// Fill the bind of each column with its client-side value when the
/// parameters carry no value (or an explicit NULL) for it.
///
/// Existing non-null values are never touched, so running it twice gives
/// the same parameters, provided computed producers are deterministic.
pub fn inject_defaults(params: &mut HashMap<String, Value>, columns: &[Arc<Column>], rule: DefaultRule) {
    for column in columns {
        let producer = match rule {
            DefaultRule::Insert => column.default.as_ref(),
            DefaultRule::Update => column.onupdate.as_ref(),
        };
        let Some(producer) = producer else {
            continue;
        };
        if !matches!(params.get(&column.key), None | Some(Value::Null)) {
            continue;
        }
        match producer.produce() {
            Some(value) if !value.is_null() => {
                params.insert(column.key.clone(), value);
            }
            _ => {}
        }
    }
}
