//! Everything between the analysis cache and pixels on screen.

pub mod frame;
pub mod map;
pub mod projector;
pub mod renderer;
pub mod scale;
pub mod scroll;
