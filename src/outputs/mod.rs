//! Run report output.
//!
//! # Submodules
//!
//! - [`json`]: Writes the [`crate::models::RunSummary`] of a run to disk
//!
//! # Output Structure
//!
//! ```text
//! summary_dir/
//! └── 2025-05-06/
//!     ├── run-081500.json
//!     └── run-091500.json
//! ```

pub mod json;
