/// Creates and configures the logging plugin for the application
///
/// Logs are sent to:
/// - Stdout (console output)
/// - Log directory (persistent file storage)
/// - Webview (browser console)
///
/// Log level is Debug in development builds and Info in production builds.
/// HTTP client internals are capped at Warn so health probes don't flood the log.
pub fn create_plugin() -> tauri_plugin_log::Builder {
    tauri_plugin_log::Builder::new()
        .targets([
            tauri_plugin_log::Target::new(tauri_plugin_log::TargetKind::Stdout),
            tauri_plugin_log::Target::new(tauri_plugin_log::TargetKind::LogDir {
                file_name: Some("eodi".to_string()),
            }),
            tauri_plugin_log::Target::new(tauri_plugin_log::TargetKind::Webview),
        ])
        .level(if cfg!(debug_assertions) {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper_util", log::LevelFilter::Warn)
}
