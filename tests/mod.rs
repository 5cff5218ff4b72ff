//! Test suite for the chat core
//!
//! - **`common`** - fixtures and assertion helpers
//! - **`integration`** - gateway scenarios, REST routes, configuration loading,
//!   startup wiring and PostgreSQL-backed store tests
//! - **`property`** - proptest properties of the store, presence and rooms

pub mod integration;
