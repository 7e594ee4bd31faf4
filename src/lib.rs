//! Capture Points API Library
//!
//! This library backs the capture point registry: contract terms and their
//! derived fields, enterprises, user profiles, the dashboard and the
//! filtered reports (printable table, CSV export and saved snapshots).
//!
//! # Modules
//!
//! - `api`: API-layer namespace (handlers, router).
//! - `core`: Domain namespace (derivation, formatting, reports, validation).
//! - `data`: Data access namespace (pool, stores).
//! - `config`: Configuration management.
//! - `db`: Database connection, pool management and migrations.
//! - `derivation`: Pass-through value, profit margin and end date.
//! - `errors`: Error handling types.
//! - `formatting`: BRL currency, dates and CNPJ masks.
//! - `handlers`: HTTP request handlers.
//! - `models`: Rows, request and response types.
//! - `reports`: Filtering, totals, dashboard summary, CSV and table output.
//! - `router`: Route table and middleware stack.
//! - `services`: Use cases composed over the stores.
//! - `storage`: Postgres stores.
//! - `validation`: Input checks shared by services.

pub mod api;
pub mod core;
pub mod data;

// Re-export primary modules for shared use in tests and other binaries
pub mod config;
pub mod db;
pub mod derivation;
pub mod errors;
pub mod formatting;
pub mod handlers;
pub mod models;
pub mod reports;
pub mod router;
pub mod services;
pub mod storage;
pub mod validation;
