// Transform pipeline - pure functions from raw rows to presentation models
pub mod chart;
pub mod compute;
pub mod counter;
pub mod table;
