pub mod blob;
pub mod config;
pub mod error;
pub mod model;
pub mod notifications;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod trigger;

pub use crate::error::{ReminderError, StoreError};
pub use crate::scheduler::{ReminderScheduler, ReminderSchedulerBuilder};
