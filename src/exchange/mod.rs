mod traits;

pub use traits::Broker;

#[cfg(test)]
pub use traits::MockBroker;
