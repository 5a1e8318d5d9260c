//! Checkpost - checkpoint status board bot

pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod guard;
pub mod keepalive;
pub mod model;
pub mod session;
pub mod storage;
pub mod store;
pub mod telegram;
pub mod telemetry;
pub mod transport;
