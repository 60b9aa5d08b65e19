use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

const MANAGED_VARS: [&str; 5] = [
    "XDG_CONFIG_HOME",
    "BLOCKDROP_SERVER__PORT",
    "BLOCKDROP_SERVER__BIND",
    "BLOCKDROP_UPLOAD__MAX_UPLOAD_MB",
    "BLOCKDROP_SESSIONS__INACTIVITY_TIMEOUT_SECS",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Restores every managed variable on drop.
struct EnvRestore {
    saved: Vec<(&'static str, Option<std::ffi::OsString>)>,
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (name, value) in self.saved.drain(..) {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

fn write_config(temp_dir: &TempDir, contents: &str) {
    let app_config_dir = temp_dir.path().join("blockdrop");
    std::fs::create_dir_all(&app_config_dir).expect("create config dir");
    std::fs::write(app_config_dir.join("config.toml"), contents).expect("write config");
}

/// Runs `f` with a temporary config file and a clean `BLOCKDROP_*` environment.
pub fn with_config_env<T>(config_toml: &str, f: impl FnOnce() -> T) -> T {
    let _guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().expect("temp dir");

    write_config(&temp_dir, config_toml);

    let restore = EnvRestore {
        saved: MANAGED_VARS
            .iter()
            .map(|name| (*name, std::env::var_os(name)))
            .collect(),
    };

    for name in MANAGED_VARS {
        std::env::remove_var(name);
    }
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());

    let result = f();
    drop(restore);
    result
}
