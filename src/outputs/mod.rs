//! Everything written to, or read back from, the data directory after fetching.
//!
//! # Submodules
//!
//! - [`combine`]: Merges normalized articles and writes the staged document
//! - [`lifecycle`]: Cleans up scratch files and promotes the staged document
//! - [`summary`]: Read-only reports over snapshots and the canonical document
//!
//! # Data Directory
//!
//! ```text
//! data/
//! ├── news_response_20250506_142501.json   # scratch, removed on success
//! ├── error_response_20250505_080000.json  # kept for diagnostics
//! ├── sweden.json                          # scratch, removed on success
//! ├── combined_news.json                   # staged, renamed on success
//! └── news.json                            # canonical, plaintext or encrypted
//! ```

pub mod combine;
pub mod lifecycle;
pub mod summary;
