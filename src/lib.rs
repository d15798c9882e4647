//! Forecast panel: polls OpenWeatherMap and keeps a display-ready forecast.
//!
//! * `fetcher` owns the poll timer and at most one current request.
//! * `data` holds the record type, the payload decoder and the collection
//!   the display reads from.
//! * `config`, `monitoring` and `display` are the ambient pieces used by the
//!   binary.

pub mod config;
pub mod data;
pub mod display;
pub mod error;
pub mod fetcher;
pub mod monitoring;
