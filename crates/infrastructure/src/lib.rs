pub mod amqp_headers;
pub mod clients;
pub mod in_memory_bus;
pub mod message_bus;
pub mod observability;

pub use clients::*;
pub use in_memory_bus::{InMemoryMessageBus, SettleAction, Settlement};
pub use message_bus::RabbitMqMessageBus;
pub use observability::*;
