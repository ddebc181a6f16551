// src/envelope/mod.rs
pub mod codec;

pub use codec::{is_splittable, merge, rebuild, split, SignedParts};
