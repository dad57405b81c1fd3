//! Domain types shared by the cleaning core, training and forecasting.
//!
//! - `table`: the date-indexed `DailyTable`
//! - `columns`: canonical column names, header aliases, header normalization
//! - `raw`: raw delimited rows as read from a source file

pub mod columns;
pub mod raw;
pub mod table;

pub use raw::*;
pub use table::*;
