//! # beaconwatch-server
//!
//! HTTP server library for the beaconwatch beacon region monitor.
//!
//! This library provides the API handlers, the notification log observer and
//! state management around a running region manager.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod notifications;
pub mod state;
