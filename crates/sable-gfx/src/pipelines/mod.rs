pub mod compute_pipeline;
pub mod graphics_pipeline;
pub mod lookup_cache;
pub mod pipeline_layout;
pub mod shader;
pub mod state;
