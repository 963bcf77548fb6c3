//! Round scheduling: calendar placement and batch partitioning

pub mod batch;
pub mod calendar;

pub use batch::{partition, BatchSlot};
pub use calendar::{next_eligible_slot, StageOffsets};
