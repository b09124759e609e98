use std::path::PathBuf;
use anyhow::Result;

/// Returns the application data directory.
/// Uses `dirs::data_dir()` + "parley" (e.g., %APPDATA%/parley or ~/.local/share/parley).
/// Creates the directory if it doesn't exist.
pub fn get_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| std::env::var("APPDATA").ok().map(PathBuf::from))
        .unwrap_or_else(std::env::temp_dir);

    let path = base.join("parley");

    if !path.exists() {
        std::fs::create_dir_all(&path)?;
    }

    Ok(path)
}

/// Cache directory for downloaded model weights.
pub fn get_model_cache_dir() -> Result<PathBuf> {
    let path = get_data_dir()?.join("cache");
    if !path.exists() {
        std::fs::create_dir_all(&path)?;
    }
    Ok(path)
}
