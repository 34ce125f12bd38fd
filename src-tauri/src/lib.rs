mod backend;
mod commands;
mod config;
mod error;
mod log;
mod runtime;
mod setup;
pub mod specta;

use tauri::RunEvent;

pub fn run() {
    let builder = specta::builder();

    tauri::Builder::default()
        .plugin(crate::log::create_plugin().build())
        .plugin(tauri_plugin_store::Builder::new().build())
        .invoke_handler(builder.invoke_handler())
        .setup(move |app| {
            builder.mount_events(app);
            setup::setup_app(app).map_err(Into::into)
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let RunEvent::Exit = event {
                setup::shutdown(app);
            }
        });
}
