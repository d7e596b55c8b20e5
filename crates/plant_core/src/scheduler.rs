use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::ReminderConfig,
    error::{ReminderError, Result},
    model::{Plant, PlantId, PlantRecord},
    notifications::{
        NotificationHandle, NotificationRequest, NotificationScheduler, NotifyError,
        ReminderPayload,
    },
    query::{self, PlantList},
    store::{RecordStore, StoreEntry},
    trigger,
};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Outcome of [`ReminderScheduler::adopt_unscheduled`].
#[derive(Debug, Default)]
pub struct AdoptionReport {
    pub adopted: Vec<PlantId>,
    pub failed: Vec<(PlantId, ReminderError)>,
}

/// Keeps saved plants and their notification triggers in lockstep.
///
/// Every stored entry owns exactly one live trigger. Mutations of the same
/// plant run one at a time; different plants proceed independently.
pub struct ReminderScheduler {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn NotificationScheduler>,
    clock: Clock,
    config: ReminderConfig,
    locks: IdLocks,
}

pub struct ReminderSchedulerBuilder {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn NotificationScheduler>,
    clock: Clock,
    config: ReminderConfig,
}

impl ReminderSchedulerBuilder {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn NotificationScheduler>) -> Self {
        Self {
            store,
            notifier,
            clock: Arc::new(Utc::now),
            config: ReminderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReminderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> ReminderScheduler {
        ReminderScheduler {
            store: self.store,
            notifier: self.notifier,
            clock: self.clock,
            config: self.config,
            locks: IdLocks::default(),
        }
    }
}

impl ReminderScheduler {
    pub fn builder(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn NotificationScheduler>,
    ) -> ReminderSchedulerBuilder {
        ReminderSchedulerBuilder::new(store, notifier)
    }

    /// Save a plant and (re)register its recurring reminder.
    ///
    /// On success the stored entry holds the new handle and any handle it
    /// replaced has been cancelled on a best-effort basis.
    #[instrument(skip(self, plant), fields(plant_id = %plant.id))]
    pub async fn save(&self, plant: Plant, chosen_time_of_day: DateTime<Utc>) -> Result<()> {
        let now = (self.clock)();
        if plant.id.is_empty() {
            return Err(ReminderError::validation("plant id must not be empty"));
        }
        if !plant.frequency.is_valid() {
            return Err(ReminderError::validation(
                "plant must be watered at least once per cycle",
            ));
        }
        if chosen_time_of_day <= now {
            return Err(ReminderError::validation("time must be in the future"));
        }

        let plan = trigger::plan_trigger(now, chosen_time_of_day, &plant.frequency)
            .ok_or_else(|| ReminderError::validation("reminder time is out of range"))?;

        let _guard = self.locks.acquire(&plant.id).await;
        let previous = self.store.get(&plant.id).await?;

        let record = PlantRecord::new(plant, plan.next_trigger_at);
        let handle = self.register(&record, plan.repeat_every_secs).await?;

        let id = record.id().clone();
        let entry = StoreEntry {
            record,
            notification_handle: handle.clone(),
        };
        if let Err(err) = self.store.put(entry).await {
            self.compensate(&id, &handle).await;
            return Err(err.into());
        }

        if let Some(previous) = previous {
            if previous.notification_handle != handle {
                self.release_stale(&previous).await;
            }
        }

        info!(
            plant_id = %id,
            handle = %handle,
            next_trigger_at = %plan.next_trigger_at,
            repeat_every_secs = plan.repeat_every_secs,
            "reminder scheduled"
        );
        Ok(())
    }

    /// Cancel a plant's reminder, then forget the plant.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &PlantId) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let Some(entry) = self.store.get(id).await? else {
            let legacy = self
                .store
                .unscheduled()
                .await?
                .iter()
                .any(|record| record.id() == id);
            if legacy && self.store.delete(id).await? {
                info!(plant_id = %id, "unscheduled plant removed");
                return Ok(());
            }
            return Err(ReminderError::NotFound(id.clone()));
        };

        match self.notifier.cancel(&entry.notification_handle).await {
            Ok(()) => {}
            Err(NotifyError::NotFound(handle)) => {
                debug!(plant_id = %id, handle = %handle, "trigger already gone");
            }
            Err(err) => return Err(ReminderError::Cancellation(err)),
        }

        if let Err(err) = self.store.delete(id).await {
            error!(
                plant_id = %id,
                handle = %entry.notification_handle,
                %err,
                "trigger cancelled but plant could not be deleted"
            );
            return Err(err.into());
        }
        info!(plant_id = %id, handle = %entry.notification_handle, "reminder removed");
        Ok(())
    }

    pub async fn get(&self, id: &PlantId) -> Result<Option<PlantRecord>> {
        Ok(self.store.get(id).await?.map(|entry| entry.record))
    }

    /// All scheduled plants, earliest due first.
    pub async fn list(&self) -> Result<PlantList> {
        let entries = self.store.all().await?;
        Ok(query::project(entries, (self.clock)(), None))
    }

    pub async fn list_in_environment(&self, environment: &str) -> Result<PlantList> {
        let entries = self.store.all().await?;
        Ok(query::project(entries, (self.clock)(), Some(environment)))
    }

    /// Register triggers for plants saved before handles were stored.
    ///
    /// The stored reminder time supplies the time of day. Plants that fail to
    /// schedule stay unscheduled and are listed in the report.
    #[instrument(skip(self))]
    pub async fn adopt_unscheduled(&self) -> Result<AdoptionReport> {
        let now = (self.clock)();
        let mut report = AdoptionReport::default();
        for record in self.store.unscheduled().await? {
            let id = record.id().clone();
            let _guard = self.locks.acquire(&id).await;
            if self.store.get(&id).await?.is_some() {
                debug!(plant_id = %id, "plant was rescheduled meanwhile");
                continue;
            }
            match self.adopt(record, now).await {
                Ok(handle) => {
                    info!(plant_id = %id, handle = %handle, "unscheduled plant adopted");
                    report.adopted.push(id);
                }
                Err(err) => {
                    warn!(plant_id = %id, %err, "unable to adopt unscheduled plant");
                    report.failed.push((id, err));
                }
            }
        }
        Ok(report)
    }
}

impl ReminderScheduler {
    async fn adopt(&self, record: PlantRecord, now: DateTime<Utc>) -> Result<NotificationHandle> {
        let plan = trigger::plan_trigger(now, record.next_trigger_at, &record.plant.frequency)
            .ok_or_else(|| ReminderError::validation("reminder time is out of range"))?;
        let record = PlantRecord::new(record.plant, plan.next_trigger_at);
        let handle = self.register(&record, plan.repeat_every_secs).await?;
        let id = record.id().clone();
        let entry = StoreEntry {
            record,
            notification_handle: handle.clone(),
        };
        if let Err(err) = self.store.put(entry).await {
            self.compensate(&id, &handle).await;
            return Err(err.into());
        }
        Ok(handle)
    }

    async fn register(
        &self,
        record: &PlantRecord,
        repeat_every_secs: u64,
    ) -> Result<NotificationHandle> {
        let request = NotificationRequest {
            title: self.config.notification_title.clone(),
            body: self.config.render_body(record.name()),
            payload: ReminderPayload {
                plant: record.clone(),
            },
            trigger_after_secs: repeat_every_secs,
            repeats: true,
        };
        self.notifier
            .schedule(request)
            .await
            .map_err(ReminderError::Scheduling)
    }

    /// Cancel a trigger whose plant could not be persisted.
    async fn compensate(&self, id: &PlantId, handle: &NotificationHandle) {
        match self.notifier.cancel(handle).await {
            Ok(()) | Err(NotifyError::NotFound(_)) => {
                debug!(plant_id = %id, handle = %handle, "orphaned trigger cancelled");
            }
            Err(err) => {
                warn!(plant_id = %id, handle = %handle, %err, "orphaned trigger left live");
            }
        }
    }

    async fn release_stale(&self, previous: &StoreEntry) {
        let handle = &previous.notification_handle;
        match self.notifier.cancel(handle).await {
            Ok(()) => debug!(plant_id = %previous.id(), handle = %handle, "replaced trigger cancelled"),
            Err(NotifyError::NotFound(_)) => {
                debug!(plant_id = %previous.id(), handle = %handle, "replaced trigger already gone");
            }
            Err(err) => {
                warn!(plant_id = %previous.id(), handle = %handle, %err, "unable to cancel replaced trigger");
            }
        }
    }
}

/// One async mutex per plant id. Idle slots are dropped on the next acquire.
#[derive(Default)]
struct IdLocks {
    slots: Mutex<HashMap<PlantId, Arc<AsyncMutex<()>>>>,
}

impl IdLocks {
    async fn acquire(&self, id: &PlantId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(id.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }
}
