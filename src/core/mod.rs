//! Core modules for trudge's reconciliation engine.
//!
//! Leaves first: the migration model and its fingerprint, the directory
//! source and database ledger, then the comparator, the applicator and the
//! synchronizer that drives them.

pub mod apply;
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod migration;
pub mod output;
pub mod progress;
pub mod source;
pub mod sync;
