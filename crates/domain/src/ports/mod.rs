pub mod messaging;
pub mod services;

pub use messaging::*;
pub use services::*;
