//! Integration tests

pub mod gateway_test;
