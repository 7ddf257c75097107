pub mod core_notifier;
pub mod manager;
pub mod message;
pub mod notifier;

pub use core_notifier::{CoreConfig, CoreNotifier};
pub use manager::NotifyManager;
pub use message::RuleNotification;
pub use notifier::{Notifier, NotifyResult};
