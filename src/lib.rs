//! # Tweet Harness
//!
//! Orchestration service for a tweet-scraping pipeline.
//!
//! Operators register search criteria; the service dispatches them to an
//! external scraper worker, tracks each run as an execution, and ingests the
//! tweets the worker sends back, deduplicating quoted tweets and reaping the
//! ones nothing references.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  enqueue   ┌──────────────┐  POST /criteria/v1  ┌─────────┐
//! │ CLI/HTTP │──────────▶│ EnqueueGuard │───────────────────▶│ scraper │
//! └──────────┘            └──────┬───────┘                     └────┬────┘
//!                                │                                  │
//!                                ▼                                  │ POST /tweets/v1
//!                          ┌──────────┐   ┌───────────────┐         │
//!                          │  SQLite  │◀──│ TweetIngester │◀────────┘
//!                          └──────────┘   └───────────────┘
//! ```
//!
//! The orchestration logic lives in the `tweet-harness-core` crate and only
//! sees storage traits and a gateway trait. This crate supplies the SQLite
//! store, the HTTP scraper client, the axum server, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! twh init                          # create database
//! twh criteria add ./criteria.json  # register a search criteria
//! twh enqueue 1                     # dispatch it to the scraper
//! twh serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the storage traits |
//! | [`scraper`] | HTTP client for the scraper worker |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command bodies |

pub mod commands;
pub mod config;
pub mod db;
pub mod logging;
pub mod migrate;
pub mod scraper;
pub mod server;
pub mod sqlite_store;
