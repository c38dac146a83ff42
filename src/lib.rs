//! Mission dispatch
//!
//! Batches of image-analysis missions are accepted by a dispatch server,
//! queued for workers that fetch each picture and ask a vision model for a
//! verdict, and the per-picture results are routed back to the requester's
//! webhook.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
