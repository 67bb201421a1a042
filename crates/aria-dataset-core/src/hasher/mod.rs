mod fingerprint;

pub use fingerprint::{fingerprint_file, read_full_file, ContentFingerprint, PREFIX_HASH_LENGTH};
