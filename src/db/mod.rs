mod connection;
mod diagnostics;
mod driver;
mod instrument;
mod query;

pub use connection::*;
pub use diagnostics::*;
pub use driver::*;
pub use instrument::{format_arg, format_elapsed, Operation};
pub use query::*;
