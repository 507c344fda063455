//! Size-bounded, timestamp-ordered chat history.
//!
//! The store gives no ordering on scan, so order is rebuilt from
//! `(timestamp, id)` on every read.

use crate::counter::Counter;
use crate::error::ChatResult;
use crate::store::{number_attr, scan_all, string_attr, Item, KeyValueStore, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Default number of retained messages
pub const DEFAULT_CAP: usize = 20;

const ID_FIELD: &str = "myid";
const TIMESTAMP_FIELD: &str = "timestamp";
const BODY_FIELD: &str = "data";

/// Smallest gap between consecutive timestamps issued by one log
const MIN_TIMESTAMP_STEP: f64 = 1e-6;

/// Source of message timestamps, in fractional seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock (seconds since the Unix epoch, microsecond resolution)
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Clock that returns a preset time and then steps forward on every read
#[derive(Debug)]
pub struct ManualClock {
    next: Mutex<f64>,
    step: f64,
}

impl ManualClock {
    pub fn new(start: f64, step: f64) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }

    /// Make the next reading return `t`
    pub fn set(&self, t: f64) {
        if let Ok(mut next) = self.next.lock() {
            *next = t;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        match self.next.lock() {
            Ok(mut next) => {
                let t = *next;
                *next += self.step;
                t
            }
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// One stored chat line. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub timestamp: f64,
    pub body: String,
}

impl MessageRecord {
    fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(ID_FIELD.to_string(), Value::from(self.id.clone()));
        item.insert(TIMESTAMP_FIELD.to_string(), Value::from(self.timestamp));
        item.insert(BODY_FIELD.to_string(), Value::from(self.body.clone()));
        item
    }

    pub(crate) fn from_item(table: &str, item: &Item) -> StoreResult<Self> {
        Ok(Self {
            id: string_attr(item, table, ID_FIELD)?.to_string(),
            timestamp: number_attr(item, table, TIMESTAMP_FIELD)?,
            body: string_attr(item, table, BODY_FIELD)?.to_string(),
        })
    }
}

/// Oldest first; equal timestamps fall back to id
fn chronological(a: &MessageRecord, b: &MessageRecord) -> Ordering {
    a.timestamp
        .total_cmp(&b.timestamp)
        .then_with(|| a.id.cmp(&b.id))
}

/// FIFO log holding at most `cap` records.
///
/// Appends through one `MessageLog` (and its clones) are serialised, so within a
/// process the bound is exact. Separate processes sharing a store can still race
/// between the scan and the insert and briefly exceed the cap.
#[derive(Clone)]
pub struct MessageLog {
    store: Arc<dyn KeyValueStore>,
    table: String,
    cap: usize,
    counter: Counter,
    clock: Arc<dyn Clock>,
    append_lock: Arc<AsyncMutex<()>>,
}

impl MessageLog {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        table: impl Into<String>,
        cap: usize,
        counter: Counter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            cap: cap.max(1),
            counter,
            clock,
            append_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Every well-formed record. Rows that do not parse are skipped so a single
    /// bad item cannot wedge appends or history reads.
    async fn records(&self) -> ChatResult<Vec<MessageRecord>> {
        let items = scan_all(self.store.as_ref(), &self.table).await?;
        Ok(items
            .iter()
            .filter_map(|item| match MessageRecord::from_item(&self.table, item) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping unreadable message row: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Store `body` as the newest record, evicting the oldest one when the log
    /// is full, then bump the message counter.
    pub async fn append(&self, body: &str) -> ChatResult<MessageRecord> {
        let _guard = self.append_lock.lock().await;

        let existing = self.records().await?;
        if existing.len() > self.cap - 1 {
            if let Some(oldest) = existing.iter().min_by(|a, b| chronological(a, b)) {
                self.store.delete(&self.table, &oldest.id).await?;
                tracing::debug!(
                    "Evicted message {} (timestamp {}) from {}",
                    oldest.id,
                    oldest.timestamp,
                    self.table
                );
            }
        }

        // Never go backwards, even if the wall clock does
        let newest = existing
            .iter()
            .map(|r| r.timestamp)
            .fold(f64::NEG_INFINITY, f64::max);
        let record = MessageRecord {
            id: ulid::Ulid::new().to_string(),
            timestamp: self.clock.now().max(newest + MIN_TIMESTAMP_STEP),
            body: body.to_string(),
        };
        self.store
            .put(&self.table, &record.id, record.to_item())
            .await?;

        let total = self.counter.increment().await?;
        tracing::debug!("Appended message {} (total {})", record.id, total);

        Ok(record)
    }

    /// Bodies of the newest `limit` records, oldest first
    pub async fn recent(&self, limit: usize) -> ChatResult<Vec<String>> {
        let mut records = self.records().await?;
        records.sort_by(chronological);

        let skip = records.len().saturating_sub(limit);
        Ok(records.into_iter().skip(skip).map(|r| r.body).collect())
    }

    /// Bodies of the whole retained history, oldest first
    pub async fn history(&self) -> ChatResult<Vec<String>> {
        self.recent(self.cap).await
    }

    /// Number of records currently stored
    pub async fn len(&self) -> ChatResult<usize> {
        Ok(scan_all(self.store.as_ref(), &self.table).await?.len())
    }
}
