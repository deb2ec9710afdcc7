//! Time-domain windowing and the per-column windowed transform.

pub mod transform;
pub mod window;
