//! Test suite for Streamcast
//!
//! This module organizes all tests

pub mod property;
