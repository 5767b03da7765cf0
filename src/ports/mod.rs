//! Ports - interfaces between the synchronization layer and its collaborators.

mod broker;
mod mutation_backend;

pub use broker::{BrokerPublisher, EnvelopeSink};
pub use mutation_backend::MutationBackend;
