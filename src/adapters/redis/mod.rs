//! Redis adapters: broker publisher and gateway-side subscriber.

pub mod publisher;
pub mod subscriber;

pub use publisher::RedisBrokerPublisher;
pub use subscriber::run_subscriber;
