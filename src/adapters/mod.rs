//! Infrastructure adapters implementing the ports.

pub mod events;
pub mod redis;
pub mod rest;
