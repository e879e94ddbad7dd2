//! # PerfHub Central
//!
//! Aggregate storage and rollup engine for the PerfHub APM backend.
//!
//! Agents emit per-minute transaction aggregates (durations, counts,
//! histograms, timer trees, per-query and per-service-call rollups,
//! profiles). This crate persists them into a wide-column store, rolls them
//! up into coarser time buckets and up the agent-rollup tree, and merges
//! arbitrary time ranges on demand for the UI.
//!
//! The agent-facing gRPC surface and the HTTP/UI layer live elsewhere; they
//! talk to this crate through [`data::aggregate::AggregateStore`] and
//! [`domain::rollup::RollupService`].

pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
