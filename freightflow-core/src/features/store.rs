//! SQLite-backed feature store keyed by (load id, feature name).

use crate::error::{FreightError, Result};
use crate::features::table::FeatureTable;
use crate::features::value::FeatureValue;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS feature_records (
    entity_key    TEXT NOT NULL,
    feature_name  TEXT NOT NULL,
    value_kind    TEXT NOT NULL,
    num_value     REAL,
    int_value     INTEGER,
    text_value    TEXT,
    computed_at   TEXT NOT NULL,
    PRIMARY KEY (entity_key, feature_name)
);
CREATE INDEX IF NOT EXISTS idx_feature_name ON feature_records (feature_name);
";

const UPSERT: &str = "
INSERT INTO feature_records
    (entity_key, feature_name, value_kind, num_value, int_value, text_value, computed_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT (entity_key, feature_name) DO UPDATE SET
    value_kind = excluded.value_kind,
    num_value = excluded.num_value,
    int_value = excluded.int_value,
    text_value = excluded.text_value,
    computed_at = excluded.computed_at
";

/// One stored feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub key: String,
    pub feature_name: String,
    pub value: FeatureValue,
    pub computed_at: DateTime<Utc>,
}

impl FeatureRecord {
    pub fn new(key: &str, feature_name: &str, value: FeatureValue) -> Self {
        Self {
            key: key.to_string(),
            feature_name: feature_name.to_string(),
            value,
            computed_at: Utc::now(),
        }
    }
}

/// Feature store with overwrite-on-recompute semantics.
///
/// One writer at a time: the store owns its connection and SQLite's busy timeout
/// serialises access from other processes.
pub struct FeatureStore {
    conn: Connection,
}

impl FeatureStore {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Store a value, replacing any earlier value for the same key and feature.
    pub fn put(&mut self, key: &str, feature_name: &str, value: FeatureValue) -> Result<()> {
        let record = FeatureRecord::new(key, feature_name, value);
        let tx = self.conn.transaction()?;
        upsert(&tx, &record)?;
        tx.commit()?;
        Ok(())
    }

    /// Store many records in one transaction. Nothing is written if any record is invalid.
    pub fn put_many(&mut self, records: &[FeatureRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for record in records {
            upsert(&tx, record)?;
        }
        tx.commit()?;
        tracing::debug!(records = records.len(), "Wrote feature records");
        Ok(records.len())
    }

    /// Value for a key and feature. `None` when nothing was stored.
    pub fn get(&self, key: &str, feature_name: &str) -> Result<Option<FeatureValue>> {
        Ok(self.get_record(key, feature_name)?.map(|r| r.value))
    }

    pub fn get_record(&self, key: &str, feature_name: &str) -> Result<Option<FeatureRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT entity_key, feature_name, value_kind, num_value, int_value, text_value,
                        computed_at
                 FROM feature_records WHERE entity_key = ?1 AND feature_name = ?2",
                params![key, feature_name],
                RawRecord::from_row,
            )
            .optional()?;
        row.map(RawRecord::into_record).transpose()
    }

    /// Every feature stored for one key.
    pub fn entity(&self, key: &str) -> Result<BTreeMap<String, FeatureValue>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_key, feature_name, value_kind, num_value, int_value, text_value,
                    computed_at
             FROM feature_records WHERE entity_key = ?1",
        )?;
        let raws = stmt
            .query_map(params![key], RawRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter()
            .map(|raw| raw.into_record().map(|r| (r.feature_name, r.value)))
            .collect()
    }

    pub fn feature_names(&self) -> Result<Vec<String>> {
        self.strings("SELECT DISTINCT feature_name FROM feature_records ORDER BY feature_name")
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.strings("SELECT DISTINCT entity_key FROM feature_records ORDER BY entity_key")
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM feature_records", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every record.
    pub fn truncate(&mut self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM feature_records", [])?;
        Ok(removed)
    }

    /// Assemble a table of `names` for `keys`, in the given key order.
    ///
    /// Every requested value must exist.
    pub fn read_table(&self, keys: &[String], names: &[&str]) -> Result<FeatureTable> {
        let mut table = FeatureTable::new(keys.to_vec());
        for name in names {
            let values = keys
                .iter()
                .map(|key| {
                    self.get(key, name)?.ok_or_else(|| {
                        FreightError::not_found(format!("feature {name} for load {key}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    fn strings(&self, sql: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let out = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(out)
    }
}

fn upsert(tx: &Transaction<'_>, record: &FeatureRecord) -> Result<()> {
    if record.key.is_empty() || record.feature_name.is_empty() {
        return Err(FreightError::feature_store(
            "feature records need a key and a feature name",
        ));
    }
    let (num, int, text): (Option<f64>, Option<i64>, Option<&str>) = match &record.value {
        FeatureValue::Float(v) => {
            if !v.is_finite() {
                return Err(FreightError::feature_store(format!(
                    "{} for {} is not finite",
                    record.feature_name, record.key
                )));
            }
            (Some(*v), None, None)
        }
        FeatureValue::Int(v) => (None, Some(*v), None),
        FeatureValue::Bool(v) => (None, Some(i64::from(*v)), None),
        FeatureValue::Text(v) => (None, None, Some(v.as_str())),
    };
    tx.execute(
        UPSERT,
        params![
            record.key,
            record.feature_name,
            record.value.kind(),
            num,
            int,
            text,
            record.computed_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Row as read from SQLite, before the typed value is reassembled.
struct RawRecord {
    key: String,
    feature_name: String,
    kind: String,
    num: Option<f64>,
    int: Option<i64>,
    text: Option<String>,
    computed_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            feature_name: row.get(1)?,
            kind: row.get(2)?,
            num: row.get(3)?,
            int: row.get(4)?,
            text: row.get(5)?,
            computed_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<FeatureRecord> {
        let corrupt = || {
            FreightError::feature_store(format!(
                "{} for {} has no {} value",
                self.feature_name, self.key, self.kind
            ))
        };
        let value = match self.kind.as_str() {
            "float" => FeatureValue::Float(self.num.ok_or_else(corrupt)?),
            "int" => FeatureValue::Int(self.int.ok_or_else(corrupt)?),
            "bool" => FeatureValue::Bool(self.int.ok_or_else(corrupt)? != 0),
            "text" => FeatureValue::Text(self.text.clone().ok_or_else(corrupt)?),
            other => {
                return Err(FreightError::feature_store(format!(
                    "unknown value kind {other}"
                )));
            }
        };
        let computed_at = DateTime::parse_from_rfc3339(&self.computed_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| FreightError::feature_store(format!("bad computed_at: {e}")))?;
        Ok(FeatureRecord {
            key: self.key,
            feature_name: self.feature_name,
            value,
            computed_at,
        })
    }
}
