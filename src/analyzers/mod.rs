//! Aggregation of classified records and time-continuity estimation.
//!
//! This module turns canonical records into count-by-label tables, numeric
//! statistics, the age curve, and the continuity report that the summary
//! builder assembles.

pub mod aggregate;
pub mod continuity;
pub mod types;
pub mod utility;
