//! Raw simulation output: loads joined with carrier decisions, partitioned by run.

use crate::error::{FreightError, Result};
use crate::market::{Location, Market};
use crate::simulation::types::{CarrierDecision, Load, SimulationRecord, SimulationRun};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS simulation_runs (
    run_id          TEXT PRIMARY KEY,
    seed            INTEGER NOT NULL,
    started_at      TEXT NOT NULL,
    load_count      INTEGER NOT NULL,
    accepted_count  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS loads (
    run_id           TEXT NOT NULL,
    id               TEXT NOT NULL,
    pickup_date      TEXT NOT NULL,
    pickup_time      TEXT NOT NULL,
    posted_time      TEXT NOT NULL,
    origin_kma       TEXT NOT NULL,
    origin_lat       REAL NOT NULL,
    origin_lon       REAL NOT NULL,
    destination_kma  TEXT NOT NULL,
    destination_lat  REAL NOT NULL,
    destination_lon  REAL NOT NULL,
    miles            INTEGER NOT NULL,
    cost             REAL NOT NULL,
    weight           INTEGER NOT NULL,
    is_accepted      INTEGER NOT NULL,
    decision_time    TEXT NOT NULL,
    PRIMARY KEY (run_id, id)
);
CREATE INDEX IF NOT EXISTS idx_pickup_date ON loads (pickup_date);
CREATE INDEX IF NOT EXISTS idx_origin_kma ON loads (origin_kma);
CREATE INDEX IF NOT EXISTS idx_destination_kma ON loads (destination_kma);
";

const SELECT_LOADS: &str = "SELECT run_id, id, pickup_time, posted_time, origin_kma, origin_lat,
        origin_lon, destination_kma, destination_lat, destination_lon, miles, cost, weight,
        is_accepted, decision_time
 FROM loads";

/// SQLite database holding simulation runs.
pub struct SimulationStore {
    conn: Connection,
}

impl SimulationStore {
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

    /// Persist a run and its records in one transaction.
    pub fn persist_run(&mut self, run: &SimulationRun, records: &[SimulationRecord]) -> Result<()> {
        if let Some(bad) = records.iter().find(|r| r.run_id != run.run_id) {
            return Err(FreightError::data(format!(
                "record {} belongs to run {}, not {}",
                bad.load.id, bad.run_id, run.run_id
            )));
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO simulation_runs
                 (run_id, seed, started_at, load_count, accepted_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.run_id,
                run.seed as i64,
                run.started_at.to_rfc3339(),
                run.load_count as i64,
                run.accepted_count as i64,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO loads
                     (run_id, id, pickup_date, pickup_time, posted_time, origin_kma, origin_lat,
                      origin_lon, destination_kma, destination_lat, destination_lon, miles, cost,
                      weight, is_accepted, decision_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;
            for record in records {
                let load = &record.load;
                stmt.execute(params![
                    record.run_id,
                    load.id,
                    load.pickup_time.date_naive().to_string(),
                    load.pickup_time.to_rfc3339(),
                    load.posted_time.to_rfc3339(),
                    load.origin.market.code(),
                    load.origin.latitude,
                    load.origin.longitude,
                    load.destination.market.code(),
                    load.destination.latitude,
                    load.destination.longitude,
                    load.distance,
                    load.offered_rate,
                    load.weight,
                    record.decision.accepted,
                    record.decision.decision_time.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        tracing::info!(
            run_id = %run.run_id,
            rows = records.len(),
            "Persisted simulation run"
        );
        Ok(())
    }

    /// Records of one run, or of every run when `run_id` is `None`, in pickup order.
    pub fn records(&self, run_id: Option<&str>) -> Result<Vec<SimulationRecord>> {
        let mut out = Vec::new();
        match run_id {
            Some(id) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{SELECT_LOADS} WHERE run_id = ?1 ORDER BY pickup_time, rowid"
                ))?;
                let mut rows = stmt.query(params![id])?;
                while let Some(row) = rows.next()? {
                    out.push(record_from_row(row)?);
                }
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{SELECT_LOADS} ORDER BY pickup_time, rowid"))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    out.push(record_from_row(row)?);
                }
            }
        }
        Ok(out)
    }

    /// All runs, oldest first.
    pub fn runs(&self) -> Result<Vec<SimulationRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, seed, started_at, load_count, accepted_count
             FROM simulation_runs ORDER BY started_at, rowid",
        )?;
        let mut rows = stmt.query([])?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next()? {
            runs.push(run_from_row(row)?);
        }
        Ok(runs)
    }

    /// Most recently started run, if any.
    pub fn latest_run(&self) -> Result<Option<SimulationRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, seed, started_at, load_count, accepted_count
             FROM simulation_runs ORDER BY started_at DESC, rowid DESC LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        rows.next()?.map(run_from_row).transpose()
    }

    pub fn load_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM loads", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FreightError::data(format!("bad timestamp {text:?}: {e}")))
}

fn run_from_row(row: &Row<'_>) -> Result<SimulationRun> {
    Ok(SimulationRun {
        run_id: row.get(0)?,
        seed: row.get::<_, i64>(1)? as u64,
        started_at: parse_time(&row.get::<_, String>(2)?)?,
        load_count: row.get::<_, i64>(3)? as usize,
        accepted_count: row.get::<_, i64>(4)? as usize,
    })
}

fn record_from_row(row: &Row<'_>) -> Result<SimulationRecord> {
    let origin_market: Market = row.get::<_, String>(4)?.parse()?;
    let destination_market: Market = row.get::<_, String>(7)?.parse()?;
    let load = Load {
        id: row.get(1)?,
        pickup_time: parse_time(&row.get::<_, String>(2)?)?,
        posted_time: parse_time(&row.get::<_, String>(3)?)?,
        origin: Location {
            market: origin_market,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
        },
        destination: Location {
            market: destination_market,
            latitude: row.get(8)?,
            longitude: row.get(9)?,
        },
        distance: row.get(10)?,
        offered_rate: row.get(11)?,
        weight: row.get(12)?,
    };
    let decision = CarrierDecision {
        load_id: load.id.clone(),
        accepted: row.get(13)?,
        decision_time: parse_time(&row.get::<_, String>(14)?)?,
    };
    Ok(SimulationRecord {
        run_id: row.get(0)?,
        load,
        decision,
    })
}
