pub mod core;
pub mod schedule;
