//! Writing a starter config file.

use super::defaults_toml;
use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Write defaults to `path`. Existing files are kept unless `force`.
pub(super) fn init_config(path: &Path, force: bool, output: &mut dyn Write) -> Result<bool> {
    if path.exists() && !force {
        bail!(
            "Config file already exists at {}. Use --force to overwrite",
            path.display()
        );
    }

    let text = defaults_toml()?;
    atomic_write(path, &text)?;
    writeln!(output, "Config written: {}", path.display())?;
    Ok(true)
}

/// Atomically replace a config file with new contents.
fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed to write temporary file {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "Failed to replace config file {} from {}",
            path.display(),
            tmp_path.display()
        )
    })?;

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let base_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("config.toml");
    path.with_file_name(format!(".{base_name}.{}.tmp", Uuid::new_v4()))
}
