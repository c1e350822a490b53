pub mod command;
pub mod events;
pub mod node_id;
pub mod ports;
pub mod target;
pub mod topic;
pub mod value_objects;

pub use command::*;
pub use events::*;
pub use feeder_errors::{FeederError, FeederResult};
pub use node_id::*;
pub use ports::*;
pub use target::*;
pub use topic::*;
pub use value_objects::*;
