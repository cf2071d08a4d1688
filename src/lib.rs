//! # Rig DAQ Core Library
//!
//! This crate is the core library of the `rig_daq` application: it records frames
//! of sensor readings from a test rig, stores them per session, and lets an
//! operator filter, sort, summarise and export what was stored. The binary
//! (`main.rs`) is a thin command-line front end over these modules.
//!
//! ## Crate Structure
//!
//! - **`channel`**: The channel registry. Which channels exist, how each is read
//!   (single value, multi-sample burst, stable reference) and the order of one sweep.
//! - **`plant`**: The `PlantReader` capability trait and a simulated rig, `MockPlant`.
//! - **`acquisition`**: Sweeps with stability cross-checks and bounded retries,
//!   encoding into rounded fields with boundary alerts, and whole acquisition runs.
//! - **`record`**: Sessions, frames, typed table cells and table schemas.
//! - **`filter`**: Exact-match and range filters with type-aware comparison, plus
//!   placeholder-aware sorting.
//! - **`stats`**: Mean and variance over the visible rows, and `FilteredView`,
//!   which recomputes them when filters change.
//! - **`storage`**: The `Repository` trait with in-memory and SQLite back ends, and
//!   CSV export.
//! - **`config`**: Layered settings (defaults, TOML file, environment) via figment.
//! - **`error`**: The crate-wide `DaqError` enum.
//! - **`logging`** / **`log_capture`**: tracing subscriber setup and an in-memory
//!   buffer of recent warnings for an operator log panel.
//! - **`validation`**: Small reusable validators.

pub mod acquisition;
pub mod channel;
pub mod config;
pub mod error;
pub mod filter;
pub mod log_capture;
pub mod logging;
pub mod plant;
pub mod record;
pub mod stats;
pub mod storage;
pub mod validation;
