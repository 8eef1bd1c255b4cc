//! Crowd monitoring backend.
//!
//! ESP32 people counters post readings to `/esp32-update`; pollers read
//! device liveness and shop crowd tiers from `/esp32-status`.

pub mod auth;
pub mod classify;
pub mod config;
pub mod db;
pub mod errors;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod rest;
pub mod seed;
pub mod service;
pub mod store;
pub mod validate;
