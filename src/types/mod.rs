//! Values exchanged with PostgreSQL and the binary codecs for the types
//! the driver has no built-in support for.

mod interval;
mod json;
mod range;
mod sql_type;
mod value;

pub use interval::Interval;
pub use json::{json_decode, json_encode, Json, Jsonb};
pub use range::Range;
pub use sql_type::SqlType;
pub use value::{NamedArgs, Value};
