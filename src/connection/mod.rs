//! Connection management for a single point-to-point link
//!
//! This module handles:
//! - Listening for an inbound connection on the service endpoint
//! - Dialing a known peer, preempting older attempts
//! - Pumping bytes both ways once connected
//! - Falling back to listening after any failure

mod config;
mod dialer;
mod listener;
mod manager;
mod pump;

pub use config::{LinkConfig, TransportMode};
pub use manager::ConnectionManager;
