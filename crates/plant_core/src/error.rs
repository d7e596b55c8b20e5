use crate::model::PlantId;
use crate::notifications::{NotificationHandle, NotifyError};

/// Failures of the durable plant blob.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored blob does not match the expected schema.
    #[error("stored plants are malformed: {reason}")]
    Malformed { reason: String },

    #[error("unable to encode plants: {0}")]
    Encode(#[source] serde_json::Error),

    /// Another plant already owns the handle; writing it would make the blob unreadable.
    #[error("notification `{handle}` already belongs to plant `{owner}`")]
    HandleInUse {
        handle: NotificationHandle,
        owner: PlantId,
    },
}

impl StoreError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    /// Bad input, rejected before anything was touched.
    #[error("invalid reminder: {0}")]
    Validation(String),

    /// The notification backend refused to register the trigger.
    #[error("unable to schedule reminder: {0}")]
    Scheduling(#[source] NotifyError),

    #[error("unable to persist plants: {0}")]
    Persistence(#[from] StoreError),

    /// The trigger could not be cancelled; the plant was kept.
    #[error("unable to cancel reminder: {0}")]
    Cancellation(#[source] NotifyError),

    #[error("no plant with id `{0}`")]
    NotFound(PlantId),
}

impl ReminderError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }
}

pub type Result<T, E = ReminderError> = std::result::Result<T, E>;
