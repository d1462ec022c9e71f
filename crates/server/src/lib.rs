//! Kiwi deploy server
//!
//! HTTP shell over `kiwi-lib`: it loads service templates, translates request
//! bodies into deployments and exposes health and metrics endpoints.

pub mod api;
pub mod config;
