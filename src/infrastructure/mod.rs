pub mod converter;
pub mod mock;
pub mod observability;
pub mod serialization;

pub use converter::{DefaultMetricConverter, GroupInterest};
pub use mock::InMemoryBroker;
pub use serialization::JsonMetricSerializer;
