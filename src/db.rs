//! Reading persistence.
//!
//! An import is a full replace of the reading set, never a merge. The
//! [`ReadingStore`] trait is the seam between the import run and the
//! datastore; [`PostgresStore`] is the production implementation (PostGIS)
//! and [`MemoryStore`] backs dry runs and tests.
//!
//! Inserts are best effort: a document that fails is recorded in the
//! [`LoadReport`] and the rest of the batch still lands. The report's
//! `attempted` count is the batch size, not a verified committed count.

use crate::logging::{self, DataSource, FailureType};
use crate::model::{ImportError, PH_RANGE, SimulatedReading, WATER_LEVEL_RANGE_M};
use postgres::error::SqlState;
use postgres::{Client, NoTls};

// ---------------------------------------------------------------------------
// Load results
// ---------------------------------------------------------------------------

/// Stage of a replace, reported to the caller as the load progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Clearing,
    Inserting,
}

/// A document that was not inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertFailure {
    /// Position in the submitted batch.
    pub index: usize,
    pub station_id: String,
    pub reason: String,
    pub failure_type: FailureType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Number of documents submitted.
    pub attempted: usize,
    pub failures: Vec<InsertFailure>,
}

impl LoadReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

pub trait ReadingStore {
    /// Replaces the entire persisted reading set with `readings`.
    fn replace_all(
        &mut self,
        readings: &[SimulatedReading],
        on_stage: &mut dyn FnMut(LoadStage),
    ) -> Result<LoadReport, ImportError>;

    /// Number of readings currently persisted.
    fn count(&mut self) -> Result<u64, ImportError>;
}

impl<S: ReadingStore + ?Sized> ReadingStore for &mut S {
    fn replace_all(
        &mut self,
        readings: &[SimulatedReading],
        on_stage: &mut dyn FnMut(LoadStage),
    ) -> Result<LoadReport, ImportError> {
        (**self).replace_all(readings, on_stage)
    }

    fn count(&mut self) -> Result<u64, ImportError> {
        (**self).count()
    }
}

/// Checks a document against the reading invariants before it is sent to
/// a store. Returns the rejection reason.
pub fn validate_document(reading: &SimulatedReading) -> Result<(), String> {
    if reading.station_id.is_empty() {
        return Err("empty station_id".to_string());
    }
    if reading.timestamp.is_none() {
        return Err("missing or unparseable timestamp".to_string());
    }
    let (level_min, level_max) = WATER_LEVEL_RANGE_M;
    if !(level_min..=level_max).contains(&reading.water_level_m) {
        return Err(format!("water_level_m {} out of range", reading.water_level_m));
    }
    if !(reading.rainfall_mm >= 0.0 && reading.rainfall_mm.is_finite()) {
        return Err(format!("rainfall_mm {} invalid", reading.rainfall_mm));
    }
    let (ph_min, ph_max) = PH_RANGE;
    if !(ph_min..=ph_max).contains(&reading.ph_level) {
        return Err(format!("ph_level {} out of range", reading.ph_level));
    }
    let [lon, lat] = reading.location.coordinates();
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(format!("coordinates [{}, {}] out of range", lon, lat));
    }
    Ok(())
}

fn rejected(index: usize, reading: &SimulatedReading, reason: String) -> InsertFailure {
    InsertFailure {
        index,
        station_id: reading.station_id.clone(),
        reason,
        failure_type: FailureType::Expected,
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store with the same acceptance rules as the database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Vec<SimulatedReading>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> &[SimulatedReading] {
        &self.documents
    }
}

impl ReadingStore for MemoryStore {
    fn replace_all(
        &mut self,
        readings: &[SimulatedReading],
        on_stage: &mut dyn FnMut(LoadStage),
    ) -> Result<LoadReport, ImportError> {
        on_stage(LoadStage::Clearing);
        let mut staged = Vec::with_capacity(readings.len());

        on_stage(LoadStage::Inserting);
        let mut report = LoadReport {
            attempted: readings.len(),
            failures: Vec::new(),
        };
        for (index, reading) in readings.iter().enumerate() {
            match validate_document(reading) {
                Ok(()) => staged.push(reading.clone()),
                Err(reason) => report.failures.push(rejected(index, reading, reason)),
            }
        }

        self.documents = staged;
        Ok(report)
    }

    fn count(&mut self) -> Result<u64, ImportError> {
        Ok(self.documents.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL / PostGIS store
// ---------------------------------------------------------------------------

const SCHEMA_SQL: &str = r#"
    CREATE EXTENSION IF NOT EXISTS postgis;

    CREATE TABLE IF NOT EXISTS sensor_readings (
        id            BIGSERIAL PRIMARY KEY,
        station_id    TEXT NOT NULL,
        "timestamp"   TIMESTAMPTZ NOT NULL,
        water_level_m DOUBLE PRECISION NOT NULL CHECK (water_level_m BETWEEN 1.0 AND 10.0),
        rainfall_mm   DOUBLE PRECISION NOT NULL DEFAULT 0 CHECK (rainfall_mm >= 0),
        ph_level      DOUBLE PRECISION CHECK (ph_level BETWEEN 6.5 AND 8.5),
        location      geography(Point, 4326) NOT NULL
    );

    CREATE INDEX IF NOT EXISTS sensor_readings_location_gist
        ON sensor_readings USING GIST (location);

    CREATE INDEX IF NOT EXISTS sensor_readings_station_time_idx
        ON sensor_readings (station_id, "timestamp");

    CREATE TABLE IF NOT EXISTS sensor_readings_staging
        (LIKE sensor_readings INCLUDING DEFAULTS INCLUDING CONSTRAINTS);
"#;

const INSERT_STAGING_SQL: &str = r#"
    INSERT INTO sensor_readings_staging
        (station_id, "timestamp", water_level_m, rainfall_mm, ph_level, location)
    VALUES
        ($1, $2, $3, $4, $5, ST_SetSRID(ST_MakePoint($6, $7), 4326)::geography)
"#;

const PROMOTE_SQL: &str = r#"
    DELETE FROM sensor_readings;
    INSERT INTO sensor_readings
        (station_id, "timestamp", water_level_m, rainfall_mm, ph_level, location)
    SELECT station_id, "timestamp", water_level_m, rainfall_mm, ph_level, location
    FROM sensor_readings_staging
    ORDER BY id;
    TRUNCATE sensor_readings_staging;
"#;

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connects without touching the schema.
    pub fn connect(database_url: &str) -> Result<Self, ImportError> {
        let client = Client::connect(database_url, NoTls).map_err(|e| {
            ImportError::DatastoreUnreachable {
                reason: e.to_string(),
            }
        })?;
        Ok(PostgresStore { client })
    }

    /// Connects and makes sure the PostGIS extension, tables and indexes
    /// exist.
    pub fn connect_and_verify(database_url: &str) -> Result<Self, ImportError> {
        let mut store = Self::connect(database_url)?;
        store.ensure_schema()?;
        logging::info(DataSource::Database, None, "Connected; schema verified");
        Ok(store)
    }

    pub fn ensure_schema(&mut self) -> Result<(), ImportError> {
        self.client.batch_execute(SCHEMA_SQL)?;
        Ok(())
    }

    pub fn client(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl ReadingStore for PostgresStore {
    /// Loads the batch into the staging table (one savepoint per document),
    /// then swaps it in for the live set and commits. Until the commit the
    /// previous reading set stays intact.
    fn replace_all(
        &mut self,
        readings: &[SimulatedReading],
        on_stage: &mut dyn FnMut(LoadStage),
    ) -> Result<LoadReport, ImportError> {
        let mut tx = self.client.transaction()?;

        on_stage(LoadStage::Clearing);
        tx.batch_execute("TRUNCATE sensor_readings_staging")?;

        on_stage(LoadStage::Inserting);
        let insert = tx.prepare(INSERT_STAGING_SQL)?;
        let mut report = LoadReport {
            attempted: readings.len(),
            failures: Vec::new(),
        };

        for (index, reading) in readings.iter().enumerate() {
            if let Err(reason) = validate_document(reading) {
                report.failures.push(rejected(index, reading, reason));
                continue;
            }

            let longitude = reading.location.longitude();
            let latitude = reading.location.latitude();
            let mut savepoint = tx.transaction()?;
            let result = savepoint.execute(
                &insert,
                &[
                    &reading.station_id,
                    &reading.timestamp,
                    &reading.water_level_m,
                    &reading.rainfall_mm,
                    &reading.ph_level,
                    &longitude,
                    &latitude,
                ],
            );

            match result {
                Ok(_) => savepoint.commit()?,
                Err(e) => {
                    savepoint.rollback()?;
                    report.failures.push(InsertFailure {
                        index,
                        station_id: reading.station_id.clone(),
                        failure_type: classify_db_failure(&e),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tx.batch_execute(PROMOTE_SQL)?;
        tx.commit()?;
        Ok(report)
    }

    fn count(&mut self) -> Result<u64, ImportError> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM sensor_readings", &[])?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }
}

/// Constraint and data errors mean the document was bad; anything else is
/// the datastore's fault.
fn classify_db_failure(err: &postgres::Error) -> FailureType {
    match err.code() {
        Some(code)
            if *code == SqlState::CHECK_VIOLATION
                || *code == SqlState::NOT_NULL_VIOLATION
                || *code == SqlState::NUMERIC_VALUE_OUT_OF_RANGE
                || *code == SqlState::INVALID_PARAMETER_VALUE =>
        {
            FailureType::Expected
        }
        _ => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
