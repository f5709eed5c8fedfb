//! Turning a provider chunk stream into message parts
//!
//! A [`ChunkSource`] yields raw provider chunks, the [`StreamAccumulator`]
//! merges their fragments into complete units, and the [`ResponseSequence`]
//! hands those units to the caller one at a time.

pub mod accumulator;
pub mod sequence;
pub mod source;

pub use accumulator::{FinishedUnit, StreamAccumulator};
pub use sequence::ResponseSequence;
pub use source::ChunkSource;
