//! Dataset output.
//!
//! # Submodules
//!
//! - [`dataset`]: CSV datasets, first-write-wins merge and atomic rewrite
//!
//! # Output Structure
//!
//! ```text
//! data/
//! ├── airline_reviews.csv
//! ├── seat_reviews.csv
//! └── lounge_reviews.csv
//! ```

pub mod dataset;
