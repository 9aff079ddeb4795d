//! Combo scheduling

mod scheduler;

pub use scheduler::{ComboScheduler, ComboUpdate, TaskStarter};
