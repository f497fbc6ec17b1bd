//! Streaming file digests.
//!
//! Manifests record a 128-bit MD5 digest per file, rendered as 32 lowercase
//! hex characters. Files are read in fixed 1 MiB chunks so memory use does
//! not depend on file size.

use crate::error::EngineError;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Bytes read per chunk while hashing.
pub const CHUNK_SIZE: usize = 1 << 20;

/// Number of hex characters in a rendered digest.
pub const DIGEST_HEX_LEN: usize = 32;

/// A 128-bit file digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 16]);

impl Digest {
    /// Digest of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        Digest(md5::compute(data).0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Error returned when a string is not 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDigestError(String);

impl fmt::Display for ParseDigestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a 32 character lowercase hex digest", self.0)
    }
}

impl std::error::Error for ParseDigestError {}

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == DIGEST_HEX_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(ParseDigestError(s.to_string()));
        }

        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseDigestError(s.to_string()))?;
        }
        Ok(Digest(bytes))
    }
}

/// Compute the digest of a file.
///
/// `on_percent` is called with the whole-number read percentage each time it
/// increases. Empty files never report progress.
///
/// # Errors
/// Returns `EngineError::ReadError` if the file cannot be opened or a read
/// fails part way through.
pub fn compute_file_digest(
    path: &Path,
    mut on_percent: impl FnMut(u8),
) -> Result<Digest, EngineError> {
    let read_error = |e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let total_size = file.metadata().map_err(read_error)?.len();

    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut read_size: u64 = 0;
    let mut last_percent: u8 = 0;

    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        context.consume(&buffer[..n]);
        read_size += n as u64;

        if total_size > 0 {
            // A file growing mid-read must not push us past 100.
            let percent = (read_size.saturating_mul(100) / total_size).min(100) as u8;
            if percent > last_percent {
                on_percent(percent);
                last_percent = percent;
            }
        }
    }

    Ok(Digest(context.compute().0))
}
