//! Stockwatch - real-time state synchronization for inventory and
//! price dashboards.
//!
//! This crate implements the push pipeline between a committed mutation
//! and a consistent client cache: event publisher, broker adapters, the
//! fan-out gateway, and the client-side transport/reconciler.

pub mod adapters;
pub mod client;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod ports;
pub mod publisher;
