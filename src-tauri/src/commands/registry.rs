/// Single source of truth for all commands
/// This macro takes a wrapper macro path and applies it to the command list
#[macro_export]
macro_rules! with_commands {
    ($($wrapper:tt)*) => {
        $($wrapper)*![
            // App
            $crate::commands::get_app_version,
            $crate::commands::is_dev_mode,
            // Runtime status
            $crate::commands::is_runtime_installed,
            $crate::commands::check_runtime_status,
            $crate::commands::check_model_status,
            $crate::commands::get_server_info,
            // Runtime actions
            $crate::commands::install_runtime,
            $crate::commands::download_model,
            // Runtime configuration
            $crate::commands::load_runtime_config,
            $crate::commands::save_runtime_config,
            // Video backend
            $crate::commands::list_videos,
            $crate::commands::upload_video,
            $crate::commands::analyze_video,
            $crate::commands::list_short_videos,
            $crate::commands::generate_shorts,
        ]
    };
}
