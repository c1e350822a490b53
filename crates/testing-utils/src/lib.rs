//! # Node Feeder Testing Utils
//!
//! Shared testing utilities for the node feeder workspace.
//!
//! ## Features
//!
//! - **Mock Services**: in-memory doubles of the fleet registry, address
//!   resolver and notification sink
//! - **Deliveries**: hand-built broker deliveries with an observable settlement
//! - **Stub Device**: an axum server standing in for a node's HTTP API
//! - **RabbitMQ Container**: broker test container for integration tests
//! - **Test Data Builders**: commands and notifications with sensible defaults
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! feeder-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod containers;
pub mod devices;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use containers::*;
pub use devices::*;
pub use helpers::*;
pub use mocks::*;
