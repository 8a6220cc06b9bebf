//! Calendar-driven busy light.
//!
//! Keeps today's calendar as a list of consolidated busy intervals and
//! drives a light agent on and off as those intervals start and end.

pub mod calendar_client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pollers;
pub mod routes;
pub mod services;
pub mod sinks;
