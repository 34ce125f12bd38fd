mod app;
mod backend;
mod registry;
mod runtime;

// Re-export all commands for convenience
pub use app::*;
pub use backend::*;
pub use runtime::*;
