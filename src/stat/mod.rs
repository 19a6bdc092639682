//! Statistics accessor: binds expressions to gathered column statistics.

mod convert;
pub use convert::*;
mod vardata;
pub use vardata::*;
