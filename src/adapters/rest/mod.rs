//! REST adapters for the persistence layer's HTTP surface.

pub mod client;

pub use client::RestMutationBackend;
