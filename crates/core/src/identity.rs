//! The node's own Ed25519 key, kept as 32 raw secret bytes on disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};
use tempfile::NamedTempFile;
use tracing::info;

/// Load the signing key at `path`, or generate and persist a new one.
pub fn load_or_generate_identity(path: &Path) -> Result<SigningKey> {
    if path.exists() {
        return read_identity(path);
    }

    let key = SigningKey::generate(&mut rand::rngs::OsRng);
    persist_identity(&key, path)?;
    info!(path = %path.display(), "generated new node identity");
    Ok(key)
}

fn read_identity(path: &Path) -> Result<SigningKey> {
    let raw = fs::read(path).with_context(|| format!("read identity key at {}", path.display()))?;
    let secret: [u8; SECRET_KEY_LENGTH] = raw.as_slice().try_into().map_err(|_| {
        anyhow!(
            "identity key at {} has {} bytes, expected {SECRET_KEY_LENGTH}",
            path.display(),
            raw.len()
        )
    })?;
    Ok(SigningKey::from_bytes(&secret))
}

fn persist_identity(key: &SigningKey, path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&parent)
        .with_context(|| format!("create identity dir {}", parent.display()))?;

    let mut temp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("create temp identity file in {}", parent.display()))?;
    temp.write_all(key.as_bytes())
        .with_context(|| format!("write temp identity file in {}", parent.display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp identity file in {}", parent.display()))?;

    temp.persist(path)
        .map_err(|e| anyhow!("persist identity key to {} failed: {}", path.display(), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_identity_is_reused() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("keys").join("identity.key");

        let first = load_or_generate_identity(&path)?;
        assert!(path.exists());
        let second = load_or_generate_identity(&path)?;
        assert_eq!(first.verifying_key(), second.verifying_key());
        Ok(())
    }

    #[test]
    fn truncated_key_file_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("identity.key");
        fs::write(&path, [1u8; 7])?;

        let err = load_or_generate_identity(&path).unwrap_err();
        assert!(err.to_string().contains("expected 32"));
        Ok(())
    }
}
