mod gfx_context;
mod state;

pub use gfx_context::GfxContext;
pub use state::{GfxAttachment, GfxContextFlags, GfxContextState, GfxResourceBinding};
