//! Derived-state core for a manufacturing operations pipeline.
//!
//! Records (IML orders, purchases, production runs, dispatches, bills) are
//! filtered by facet, grouped into company → order → product trees, given an
//! aggregate status, and balanced against their consumption ledgers.

pub mod adapter;
pub mod config;
pub mod error;
pub mod filter;
pub mod hierarchy;
pub mod ledger;
pub mod migration;
pub mod record;
pub mod service;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod utils;
