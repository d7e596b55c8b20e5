use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::PlantRecord;

/// Opaque identifier handed out by the notification backend for one live
/// recurring trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationHandle(String);

impl NotificationHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the backend hands back to the app when a reminder fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReminderPayload {
    pub plant: PlantRecord,
}

impl ReminderPayload {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub payload: ReminderPayload,
    /// Seconds until the first delivery, and between deliveries when `repeats`.
    pub trigger_after_secs: u64,
    pub repeats: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The handle is unknown to the backend; it already fired for good or was cancelled.
    #[error("notification `{0}` is not scheduled")]
    NotFound(NotificationHandle),

    #[error("notification backend rejected the request: {0}")]
    Rejected(String),

    #[error("notification backend unavailable: {0}")]
    Unavailable(String),
}

/// Platform notification adapters implement this trait. Implementations own
/// delivery timing and are expected to keep their schedules across restarts.
#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    /// Register a trigger and return the handle that identifies it.
    async fn schedule(&self, request: NotificationRequest)
        -> Result<NotificationHandle, NotifyError>;

    /// Cancel a trigger. Unknown handles report [`NotifyError::NotFound`].
    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), NotifyError>;
}

/// In-process notification backend. Keeps every live trigger in memory and
/// can be told to fail, which makes it usable both on desktop hosts without
/// an OS scheduler and as a test double.
#[derive(Debug)]
pub struct MemoryNotifier {
    session: String,
    next_id: AtomicU64,
    live: Mutex<HashMap<NotificationHandle, NotificationRequest>>,
    failures: Mutex<Failures>,
}

#[derive(Debug, Default)]
struct Failures {
    schedule: VecDeque<NotifyError>,
    cancel: VecDeque<NotifyError>,
}

static INSTANCES: AtomicU64 = AtomicU64::new(0);

impl Default for MemoryNotifier {
    fn default() -> Self {
        // Handles must stay unique across instances and process restarts,
        // since stores outlive the notifier that filled them.
        let started = Utc::now().timestamp_micros();
        let instance = INSTANCES.fetch_add(1, Ordering::Relaxed);
        Self {
            session: format!("{started:x}-{}-{instance}", std::process::id()),
            next_id: AtomicU64::new(0),
            live: Mutex::default(),
            failures: Mutex::default(),
        }
    }
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `schedule` call fail with `error`.
    pub fn fail_next_schedule(&self, error: NotifyError) {
        self.failures.lock().schedule.push_back(error);
    }

    /// Make the next `cancel` call fail with `error`.
    pub fn fail_next_cancel(&self, error: NotifyError) {
        self.failures.lock().cancel.push_back(error);
    }

    pub fn is_live(&self, handle: &NotificationHandle) -> bool {
        self.live.lock().contains_key(handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    pub fn request(&self, handle: &NotificationHandle) -> Option<NotificationRequest> {
        self.live.lock().get(handle).cloned()
    }

    /// Live triggers whose payload names the given plant.
    pub fn live_for_plant(&self, plant_id: &str) -> Vec<NotificationHandle> {
        let mut handles: Vec<NotificationHandle> = self
            .live
            .lock()
            .iter()
            .filter(|(_, request)| request.payload.plant.id().as_str() == plant_id)
            .map(|(handle, _)| handle.clone())
            .collect();
        handles.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        handles
    }
}

#[async_trait]
impl NotificationScheduler for MemoryNotifier {
    async fn schedule(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationHandle, NotifyError> {
        if let Some(err) = self.failures.lock().schedule.pop_front() {
            return Err(err);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = NotificationHandle::new(format!("reminder-{}-{id}", self.session));
        tracing::debug!(
            handle = %handle,
            plant_id = %request.payload.plant.id(),
            after_secs = request.trigger_after_secs,
            repeats = request.repeats,
            "trigger registered"
        );
        self.live.lock().insert(handle.clone(), request);
        Ok(handle)
    }

    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), NotifyError> {
        if let Some(err) = self.failures.lock().cancel.pop_front() {
            return Err(err);
        }
        match self.live.lock().remove(handle) {
            Some(_) => Ok(()),
            None => Err(NotifyError::NotFound(handle.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Frequency, Plant, PlantId};
    use chrono::TimeZone;

    fn request(id: &str) -> NotificationRequest {
        let plant = Plant {
            id: PlantId::new(id),
            name: "Zamioculca".into(),
            about: String::new(),
            water_tips: String::new(),
            photo: String::new(),
            environments: vec!["bedroom".into()],
            frequency: Frequency::weekly(1),
        };
        let due = Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
        NotificationRequest {
            title: "Heeey".into(),
            body: "water it".into(),
            payload: ReminderPayload {
                plant: PlantRecord::new(plant, due),
            },
            trigger_after_secs: 604_800,
            repeats: true,
        }
    }

    #[tokio::test]
    async fn cancel_twice_reports_not_found() {
        let notifier = MemoryNotifier::new();
        let handle = notifier.schedule(request("1")).await.expect("schedule");
        assert!(notifier.is_live(&handle));

        notifier.cancel(&handle).await.expect("first cancel");
        assert!(matches!(
            notifier.cancel(&handle).await,
            Err(NotifyError::NotFound(_))
        ));
        assert_eq!(notifier.live_count(), 0);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let notifier = MemoryNotifier::new();
        notifier.fail_next_schedule(NotifyError::Unavailable("permissions denied".into()));
        assert!(notifier.schedule(request("1")).await.is_err());
        assert!(notifier.schedule(request("1")).await.is_ok());
        assert_eq!(notifier.live_for_plant("1").len(), 1);
    }

    #[tokio::test]
    async fn separate_instances_never_reuse_handles() {
        let first = MemoryNotifier::new();
        let second = MemoryNotifier::new();
        let a = first.schedule(request("1")).await.expect("schedule");
        let b = second.schedule(request("2")).await.expect("schedule");
        assert_ne!(a, b);
    }

    #[test]
    fn payload_survives_delivery_encoding() {
        let payload = request("42").payload;
        let raw = payload.to_json().expect("encode payload");
        let decoded = ReminderPayload::from_json(&raw).expect("decode payload");
        assert_eq!(decoded.plant.id().as_str(), "42");
        assert_eq!(decoded.plant.name(), "Zamioculca");
    }
}
