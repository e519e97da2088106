//! Jobline - execution tracking for solver job pairs
//!
//! This library provides the core functionality for Jobline, including:
//! - Status codes, their classes and the forward-only lifecycle
//! - SQLite persistence of pairs, pipeline stages, inputs and attributes
//! - Output and log path resolution, including the legacy layouts
//! - Sandboxed post-processing of stage output
//! - Result classification and result-review filters
//! - Submission to and termination on a compute backend
//! - CLI command parsing and execution
//!
//! # Example
//!
//! ```no_run
//! use jobline::cli::run;
//!
//! fn main() {
//!     if let Err(e) = run() {
//!         eprintln!("Error: {}", e);
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod filter;
pub mod lifecycle;
pub mod models;
pub mod paths;
pub mod processing;
pub mod properties;
pub mod repo;
pub mod store;
pub mod utils;
