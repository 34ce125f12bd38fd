use derive_more::{Display, From};

/// Errors that abort application setup
#[derive(Debug, From, Display)]
pub enum Error {
    #[from]
    #[display("{_0}")]
    Tauri(tauri::Error),

    #[from]
    #[display("Failed to open config store: {_0}")]
    Store(tauri_plugin_store::Error),

    #[from]
    #[display("{_0}")]
    Inventory(crate::runtime::inventory::InventoryError),

    #[from]
    #[display("{_0}")]
    Backend(crate::backend::BackendError),
}

impl std::error::Error for Error {}
