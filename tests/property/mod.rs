//! Property-based tests

pub mod log_proptest;
