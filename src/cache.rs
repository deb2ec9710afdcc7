//! The persistent analysis store and the background worker that fills it.

pub mod analysis;
pub mod fill;
