//! WagerLine - Request-rate governor for the wagering API surface
//!
//! This crate throttles callers of the WagerLine HTTP API according to
//! per-endpoint-class policies, protecting authentication, wagering,
//! payment, and AI-analysis endpoints from abuse. It degrades to an
//! in-process approximation whenever the shared counting store is
//! unreachable or unconfigured.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
