//! Core business logic modules

pub mod race_plan;

// Re-export commonly used types
pub use race_plan::{class_pace, gap_to_leader, lap_count, pit_events, stint_count, tyre_strategy};
