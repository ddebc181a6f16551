// src/utils/mod.rs
pub mod serialization;
