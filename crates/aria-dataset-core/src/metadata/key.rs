use std::path::Path;

/// Lookup key for a file: the file name up to its first `_` with leading
/// zeros removed. `None` when that leaves nothing.
///
/// A name without an underscore is used whole, extension included.
pub fn record_key(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let prefix = name.split('_').next().unwrap_or_default();
    let key = prefix.trim_start_matches('0');
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}
