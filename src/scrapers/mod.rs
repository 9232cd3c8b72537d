//! Review site parsers.
//!
//! A parser turns the markup of one listing page into [`Review`] records plus
//! the pagination hints the crawler needs. Parsers never touch the network;
//! fetching lives in [`crate::fetch`] and page iteration in [`crate::crawl`].
//!
//! # Supported Sources
//!
//! | Source | Module | Sections |
//! |--------|--------|----------|
//! | AirlineQuality (Skytrax) | [`airlinequality`] | airline, seat, lounge |
//!
//! [`Review`]: crate::models::Review

pub mod airlinequality;
