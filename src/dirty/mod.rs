//! Dirty-region computation pipeline.
//!
//! Per-drawable managers collect dirty rects ([`manager`]), the per-screen
//! aggregator merges them across buffer-age history ([`aggregate`]), filter
//! effects expand the result to their full footprint ([`filter`]), and the
//! bounded rect merger keeps the final list short ([`merge`]).

pub mod aggregate;
pub mod filter;
pub mod manager;
pub mod merge;
