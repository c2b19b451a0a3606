// Messaging - Listener sets, last-value notifiers, and thread channels

pub mod channels;
pub mod command;
pub mod listeners;
pub mod notifier;

pub use listeners::{ListenerSet, Subscription};
pub use notifier::Notifier;
