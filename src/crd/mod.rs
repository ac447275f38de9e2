//! Custom resource definitions

pub mod schedule;
