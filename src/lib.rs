//! Natural-language questions in, SQL and its MySQL result out.
//!
//! The binary in `main.rs` wires these modules together; tests and other
//! callers can use them directly.

pub mod config;
pub mod db;
pub mod llm;
pub mod util;
pub mod web;
