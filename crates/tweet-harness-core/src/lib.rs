//! # Tweet Harness Core
//!
//! Runtime-agnostic logic for Tweet Harness: data models, the sentinel
//! error taxonomy, narrow storage traits, the scraper gateway trait, the
//! enqueue guard, and the tweet batch ingester.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. Storage and
//! transport are supplied by callers through the traits in [`store`] and
//! [`gateway`].

pub mod enqueue;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod models;
pub mod store;

pub use error::{Error, Result};
