// src/core/storage/mod.rs

pub mod variable_store;

pub use variable_store::{SetOutcome, Snapshot, VariableStore};
