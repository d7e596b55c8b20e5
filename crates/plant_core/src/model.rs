use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Stable identifier of a plant, assigned by the catalog the plant came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PlantId(String);

impl PlantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PlantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PlantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// Older installs wrote numeric ids; both shapes decode to the same string id.
impl<'de> Deserialize<'de> for PlantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl<'v> de::Visitor<'v> for IdVisitor {
            type Value = PlantId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a plant id as string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PlantId, E> {
                Ok(PlantId::new(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<PlantId, E> {
                Ok(PlantId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<PlantId, E> {
                Ok(PlantId(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<PlantId, E> {
                Ok(PlantId(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RepeatEvery {
    Day,
    Week,
}

/// How many times per cycle a plant wants water.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Frequency {
    pub times: u32,
    pub repeat_every: RepeatEvery,
}

impl Frequency {
    pub fn daily(times: u32) -> Self {
        Self {
            times,
            repeat_every: RepeatEvery::Day,
        }
    }

    pub fn weekly(times: u32) -> Self {
        Self {
            times,
            repeat_every: RepeatEvery::Week,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.times >= 1
    }
}

/// Descriptive catalog data for a plant. Opaque to the scheduler apart from
/// `id`, `name` and `frequency`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plant {
    pub id: PlantId,
    pub name: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub water_tips: String,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub environments: Vec<String>,
    pub frequency: Frequency,
}

impl Plant {
    pub fn in_environment(&self, environment: &str) -> bool {
        self.environments.iter().any(|env| env == environment)
    }
}

/// A plant the owner committed to, with the moment its next reminder fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlantRecord {
    #[serde(flatten)]
    pub plant: Plant,
    #[serde(rename = "dateTimeNotification")]
    pub next_trigger_at: DateTime<Utc>,
}

impl PlantRecord {
    pub fn new(plant: Plant, next_trigger_at: DateTime<Utc>) -> Self {
        Self {
            plant,
            next_trigger_at,
        }
    }

    pub fn id(&self) -> &PlantId {
        &self.plant.id
    }

    pub fn name(&self) -> &str {
        &self.plant.name
    }
}
