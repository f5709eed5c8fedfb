//! Conversion between provider-neutral types and wire formats

pub mod openai;
