//! Core domain + application logic for the reaction boost bot.
//!
//! This crate is framework-agnostic. Telegram and Postgres live behind ports
//! (traits) implemented in adapter crates.

pub mod activity;
pub mod boost;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod monitor;
pub mod ports;
pub mod scheduler;
pub mod settings;
pub mod storage;

pub use errors::{Error, Result};
