pub mod handler;
pub mod pipeline;
pub mod subsystems;

pub use handler::LookingGlassHandler;
pub use pipeline::{Pipeline, PipelineState, ShutdownOutcome};
pub use subsystems::channel::{EventSender, Stage};
