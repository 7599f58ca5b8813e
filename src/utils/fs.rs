use std::fs;
use std::io::{self, Write};
use sha2::{Digest, Sha256};
use std::path::Path;

const TOKEN_PREFIX_LEN: usize = 64;

/// Writes `content` to a sibling temp file, fsyncs it and renames it over
/// `path`. Readers see either the old file or the new one, never a mix.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("no parent directory: {:?}", path))
    })?;

    if !parent.as_os_str().is_empty() && !parent.exists() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;

    #[cfg(unix)]
    if !parent.as_os_str().is_empty() {
        // Persist the rename itself.
        fs::File::open(parent)?.sync_all()?;
    }

    Ok(())
}

/// First 8 hex digits of the SHA-256 of `raw`.
pub fn short_digest(raw: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(raw.as_bytes()));
    digest[..8].to_string()
}

/// Reduces arbitrary tool input (URLs, host lists) to a file-name-safe token.
/// The readable prefix is truncated; the digest suffix keeps tokens of
/// distinct inputs distinct.
pub fn file_token(raw: &str) -> String {
    let prefix: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .take(TOKEN_PREFIX_LEN)
        .collect();
    let prefix = prefix.trim_matches('.');
    let prefix = if prefix.is_empty() { "input" } else { prefix };
    format!("{}_{}", prefix, short_digest(raw))
}
