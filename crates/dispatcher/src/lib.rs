//! Command dispatch services
//!
//! Consumes node commands from the broker, fans wildcard targets out into
//! per-node commands and delivers concrete commands to devices over HTTP.
//! Transient failures go back to the broker's waiting queue until the retry
//! budget is spent.

pub mod executor;
pub mod listener;
pub mod metrics;
pub mod multiplier;
pub mod notifier;
pub mod publisher;
pub mod retry_policy;

pub use executor::{DeviceSettings, HttpCommandExecutor};
pub use listener::{ListenerSettings, ListenerState, RetryingDispatchListener};
pub use multiplier::RequestMultiplier;
pub use notifier::{EventNotifier, NotificationOutcome, NotifierSettings};
pub use publisher::CommandPublisher;
pub use retry_policy::{DeliveryOutcome, RetryPolicy};
