//! Spectral analysis cache and renderer: a background worker fills a
//! column store of STFT magnitudes and phases while the render side maps
//! cached columns through a colour pipeline into a scrollable pixel cache.

pub mod cache;
pub mod dsp;
pub mod engine;
pub mod export;
pub mod render;
pub mod types;

pub use cache::analysis::AnalysisCache;
pub use cache::fill::{CacheFillWorker, FillParams};
pub use dsp::window::WindowType;
pub use engine::{ColumnSnap, SpectrogramEngine};
pub use export::{ExportParams, TimestampFormat};
pub use render::frame::{BinDisplay, Normalization};
pub use render::map::ColourMapKind;
pub use render::projector::BinScale;
pub use render::scale::{ColourScaleParams, LevelScale};
pub use types::{
    GeometryProvider, Image, MagnitudeRange, PaintTarget, Rect, RenderResult, SampleSource,
};
