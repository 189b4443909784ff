//! On-disk token storage
//!
//! One `TokenData` JSON document per file. Writes go through a temp file in
//! the same directory and a rename, so a crash never leaves a half-written
//! token file behind. The file is readable by the owner only.

use std::path::Path;

use tracing::debug;
use withings_core::TokenData;

use crate::error::{Error, Result};

/// Read token data, or `None` when no file exists yet.
pub async fn load(path: &Path) -> Result<Option<TokenData>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no token file");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let data = serde_json::from_str(&contents)
        .map_err(|e| Error::TokenFile(format!("parsing {}: {e}", path.display())))?;
    Ok(Some(data))
}

/// Persist token data atomically with 0600 permissions.
pub async fn save(path: &Path, data: &TokenData) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::TokenFile(format!("serializing token data: {e}")))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::TokenFile(format!("{} is not a file path", path.display())))?;
    let tmp_path = path.with_file_name(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    tokio::fs::write(&tmp_path, json.as_bytes()).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms).await?;
    }

    tokio::fs::rename(&tmp_path, path).await?;

    debug!(path = %path.display(), "persisted token data");
    Ok(())
}
