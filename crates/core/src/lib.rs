//! Core library for retitle
//!
//! This crate implements the **Functional Core** of the retitle application,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! The retitle project splits its work across three crates:
//!
//! - **`retitle_core`** (this crate): Pure transformation functions with zero I/O
//! - **`pdf`**: Loads a PDF and turns its first page into positioned words
//! - **`retitle`**: Directory scanning, renaming and reporting (the Imperative Shell)
//!
//! ## Functional Core Principles
//!
//! All functions in this crate adhere to these principles:
//!
//! - **Pure functions**: Same input always produces the same output
//! - **No side effects**: No I/O operations, no external state mutations
//! - **Testable**: Can be tested with simple fixture data, no mocking required
//!
//! # Module Organization
//!
//! - [`title`]: Line grouping and the centered/all-caps title heuristic
//! - [`filename`]: Turning a detected title into a safe target file name
//!
//! # Example Usage
//!
//! ```rust
//! use retitle_core::title::{detect_title, WordToken};
//!
//! let words = vec![
//!     WordToken::new("MAIN", 250.0, 300.0, 50.0),
//!     WordToken::new("TITLE", 305.0, 360.0, 50.0),
//! ];
//!
//! assert_eq!(detect_title(600.0, &words).as_deref(), Some("MAIN TITLE"));
//! ```

pub mod filename;
pub mod title;
