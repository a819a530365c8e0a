use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AggregateResults, CashflowEvent};

/// Scenario configuration as the user entered it: rate fields are
/// percentages here (4.0 = 4%), converted to fractions only when a run is
/// built from the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    pub portfolio_value: f64,
    pub annual_expenses: f64,
    pub retirement_years: u32,
    pub withdrawal_rate: f64,
    pub market_return: f64,
    pub inflation_rate: f64,
    pub num_simulations: u32,
    #[serde(default)]
    pub income_events: Vec<CashflowEvent>,
    #[serde(default)]
    pub expense_events: Vec<CashflowEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRecord {
    pub id: String,
    pub name: String,
    pub config: ScenarioConfig,
    pub results: Option<AggregateResults>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key-value persistence for named scenarios. Implementations are best
/// effort: a failed write must not fail the caller.
pub trait ScenarioStore: Send + Sync {
    fn get(&self, id: &str) -> Option<ScenarioRecord>;
    fn put(&self, record: ScenarioRecord);
    fn delete(&self, id: &str) -> bool;
    /// All records, most recently updated first.
    fn list(&self) -> Vec<ScenarioRecord>;
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn next_scenario_id(now: DateTime<Utc>) -> String {
    let n = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("scenario_{}_{n}", now.timestamp_millis())
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, ScenarioRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScenarioStore for MemoryStore {
    fn get(&self, id: &str) -> Option<ScenarioRecord> {
        self.records
            .lock()
            .expect("scenario store lock")
            .get(id)
            .cloned()
    }

    fn put(&self, record: ScenarioRecord) {
        self.records
            .lock()
            .expect("scenario store lock")
            .insert(record.id.clone(), record);
    }

    fn delete(&self, id: &str) -> bool {
        self.records
            .lock()
            .expect("scenario store lock")
            .remove(id)
            .is_some()
    }

    fn list(&self) -> Vec<ScenarioRecord> {
        let mut records: Vec<ScenarioRecord> = self
            .records
            .lock()
            .expect("scenario store lock")
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records
    }
}

/// Whole-document JSON persistence: the full record map is rewritten on
/// every mutation. An unreadable or malformed file loads as an empty
/// store; write failures are logged and the in-memory state keeps
/// serving.
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<HashMap<String, ScenarioRecord>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "scenario file malformed, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    fn persist(&self, records: &HashMap<String, ScenarioRecord>) {
        let serialized = match serde_json::to_string(records) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(error = %e, "scenario serialization failed");
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, serialized) {
            tracing::warn!(path = %self.path.display(), error = %e, "scenario write failed");
        }
    }
}

impl ScenarioStore for JsonFileStore {
    fn get(&self, id: &str) -> Option<ScenarioRecord> {
        self.records
            .lock()
            .expect("scenario store lock")
            .get(id)
            .cloned()
    }

    fn put(&self, record: ScenarioRecord) {
        let mut records = self.records.lock().expect("scenario store lock");
        records.insert(record.id.clone(), record);
        self.persist(&records);
    }

    fn delete(&self, id: &str) -> bool {
        let mut records = self.records.lock().expect("scenario store lock");
        let removed = records.remove(id).is_some();
        if removed {
            self.persist(&records);
        }
        removed
    }

    fn list(&self) -> Vec<ScenarioRecord> {
        let mut records: Vec<ScenarioRecord> = self
            .records
            .lock()
            .expect("scenario store lock")
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records
    }
}
