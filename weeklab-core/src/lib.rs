//! Weeklab Core — domain types, calendar math, partitioned store, collaborators.
//!
//! This crate contains the data layer and the collaborator seams of the
//! weekly options backtester:
//! - Domain types (bars, option chains, legs, positions, trade records)
//! - ISO-week calendar math (Monday normalization, third Fridays)
//! - Partitioned SQLite store: one file per symbol+month (bars) or
//!   symbol+month+expiration (option chains), with a bounded LRU
//!   connection manager and a cross-partition query engine
//! - Strategy-decision and fill-engine traits with config-selected built-ins
//! - Deterministic per-week RNG derivation

pub mod calendar;
pub mod domain;
pub mod fill;
pub mod rng;
pub mod store;
pub mod strategy;
