//! Data Plane server
//!
//! Serves typed tables loaded from table spec and CSV files over the Data
//! Plane HTTP protocol.

pub mod api;
pub mod app;
pub mod core;
pub mod data;
