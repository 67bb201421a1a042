mod walk;

pub use walk::{discover_files, ensure_root, Discovery};
