use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Only this many leading bytes take part in the fingerprint. Files that share
/// a prefix of this length are treated as the same content.
pub const PREFIX_HASH_LENGTH: usize = 8 * 1024; // 8KB

/// BLAKE3 digest of the first [`PREFIX_HASH_LENGTH`] bytes of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFingerprint([u8; 32]);

impl ContentFingerprint {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

pub fn fingerprint_file(file: &Path) -> io::Result<ContentFingerprint> {
    let data = read_portion(file)?;
    Ok(ContentFingerprint::from_bytes(&data))
}

fn read_portion(file: &Path) -> io::Result<Vec<u8>> {
    let f = File::open(file)?;
    let mut buffer = Vec::with_capacity(PREFIX_HASH_LENGTH);
    // `take` keeps reading through short reads until the limit or EOF.
    f.take(PREFIX_HASH_LENGTH as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn read_full_file(file: &Path) -> io::Result<Vec<u8>> {
    let mut f = File::open(file)?;
    let mut buffer = Vec::new();
    f.read_to_end(&mut buffer)?;
    Ok(buffer)
}
