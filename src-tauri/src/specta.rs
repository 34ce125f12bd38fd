use tauri_specta::{collect_events, Builder};

use crate::runtime::{DownloadProgress, RuntimeStatus};

/// Where the generated TypeScript bindings are written, relative to `src-tauri`
const BINDINGS_PATH: &str = "../ui/bindings.ts";

/// Typed commands and events shared by the invoke handler and the bindings.
///
/// Debug builds also regenerate the TypeScript bindings.
pub fn builder() -> Builder<tauri::Wry> {
    let builder = Builder::<tauri::Wry>::new()
        .commands(crate::with_commands!(tauri_specta::collect_commands))
        .events(collect_events![RuntimeStatus, DownloadProgress]);

    #[cfg(debug_assertions)]
    export_bindings(&builder);

    builder
}

#[cfg(debug_assertions)]
fn export_bindings(builder: &Builder<tauri::Wry>) {
    if let Err(e) = builder.export(specta_typescript::Typescript::default(), BINDINGS_PATH) {
        log::warn!("Failed to export TypeScript bindings: {}", e);
    }
}
