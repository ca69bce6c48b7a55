pub mod audio;
pub mod compose;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod render;
pub mod sequence;
pub mod subtitle;
pub mod transcribe;

pub use config::{Config, Language, RenderConfig};
pub use error::{ReelError, Result};
pub use pipeline::{
    print_summary, render_episode, render_episode_with_cancel, EpisodeManifest, PartSpec,
    PipelineOptions, PipelineResult, PipelineStats,
};
