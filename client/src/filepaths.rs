use std::path::PathBuf;

const SETTINGS_FILE_NAME: &str = "cf_client_settings.json";
const LOG_FILE_NAME: &str = "cf_client.log";
const CACHE_DIR_NAME: &str = ".crossfire";

/// Returns the directory containing the running executable.
///
/// Falls back to `"."` if `current_exe()` cannot be resolved (should be rare).
fn exe_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn working_directory() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the path to the JSON settings file in the working directory.
pub fn settings_file_path() -> PathBuf {
    working_directory().join(SETTINGS_FILE_NAME)
}

/// Returns the default log file name in the working directory.
pub fn log_file_path() -> PathBuf {
    working_directory().join(LOG_FILE_NAME)
}

/// Returns the per-user cache directory holding `gfx/` overrides and the
/// private `image-cache/`.
///
/// # Returns
/// * `PathBuf` pointing to `$HOME/.crossfire` (or `%APPDATA%`), `./.crossfire` otherwise.
pub fn default_cache_directory() -> PathBuf {
    let base = std::env::var("HOME")
        .or_else(|_| std::env::var("APPDATA"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| working_directory());
    base.join(CACHE_DIR_NAME)
}

/// Returns the read-only data directory with the public image archive.
///
/// During `cargo run` this is `data/` in the crate root, otherwise `data/`
/// next to the executable.
pub fn default_data_directory() -> PathBuf {
    if std::env::var("CARGO_MANIFEST_DIR").is_ok() {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
    } else {
        exe_directory().join("data")
    }
}
