//! aquamapper_service: simulated water-quality import for the AquaMapper
//! sensor map.
//!
//! # Module structure
//!
//! ```text
//! aquamapper_service
//! ├── model       - shared data types (RawRow, SimulatedReading, PointGeometry, ImportError)
//! ├── config      - TOML settings, simulation constants, DATABASE_URL
//! ├── stations    - station registry and record filter
//! ├── ingest
//! │   └── csv_source - sensor CSV export reader
//! ├── simulate    - sequential water level / pH simulator
//! │   └── metrics - stateless per-row formulas
//! ├── geo         - point geometry attachment
//! ├── db          - bulk replace into PostGIS (or memory)
//! ├── import      - run state machine and pipeline wiring
//! └── logging     - tracing setup and structured log helpers
//! ```

pub mod config;
pub mod db;
pub mod geo;
pub mod import;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod simulate;
pub mod stations;
