pub mod app_config;
pub mod broker;
pub mod clients;
pub mod dispatcher;
pub mod observability;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use broker::BrokerConfig;
pub use clients::{DeviceConfig, NnsConfig, NotifierConfig, RegistryConfig};
pub use dispatcher::DispatcherConfig;
pub use observability::ObservabilityConfig;
