use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::common::config::AppConfig;

/// Write the resolved config path to provided writer.
pub(super) fn path_config_with_writer(path: &Path, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "{}", path.display())?;
    Ok(())
}

/// Render the effective config as TOML. Password digests are masked.
pub(super) fn show_config_with_io(
    path: &Path,
    config: &AppConfig,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    if !path.exists() {
        writeln!(stderr, "No config file found at {}", path.display())?;
        writeln!(
            stderr,
            "Showing defaults merged with BLOCKDROP_* environment variables."
        )?;
    }

    let mut masked = config.clone();
    for user in &mut masked.users {
        user.password_sha256 = "********".to_string();
    }
    let text = toml::to_string_pretty(&masked).context("Failed to serialize config")?;
    stdout.write_all(text.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{path_config_with_writer, show_config_with_io};
    use crate::collab::hash_password;
    use crate::common::config::{AppConfig, UserEntry};

    #[test]
    fn path_command_writes_display_path() {
        let path = std::path::Path::new("/tmp/blockdrop-config.toml");
        let mut out = Vec::new();

        path_config_with_writer(path, &mut out).expect("path output should succeed");

        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text, "/tmp/blockdrop-config.toml\n");
    }

    #[test]
    fn show_command_masks_password_digests() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").expect("write config");

        let mut config = AppConfig::default();
        config.users.push(UserEntry {
            id: "alice".to_string(),
            password_sha256: hash_password("secret"),
            max_upload_mb: None,
        });

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        show_config_with_io(&path, &config, &mut stdout, &mut stderr).expect("show");

        let text = String::from_utf8(stdout).expect("utf8");
        assert!(text.contains("alice"));
        assert!(!text.contains(&hash_password("secret")));
        assert!(stderr.is_empty());
    }

    #[test]
    fn show_command_emits_missing_file_guidance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing-config.toml");

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        show_config_with_io(&path, &AppConfig::default(), &mut stdout, &mut stderr)
            .expect("show should succeed when file is missing");

        assert!(String::from_utf8(stdout).expect("utf8").contains("[server]"));
        let err = String::from_utf8(stderr).expect("utf8");
        assert!(err.contains("No config file found at"));
    }
}
