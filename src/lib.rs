//! crowd-scheduler library
//!
//! Task assignment for crowdsourcing projects: storage, scheduling policies,
//! the HTTP API and CLI definitions.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod sched;
pub mod server;
pub mod types;
