//! Wire format types for the provider API
//!
//! Pure serde structs matching the provider's JSON API format. They are only
//! used at the boundary; callers work with [`crate::types`].

pub mod openai;
