mod common;

use blockdrop::common::config::{apply_overrides, load_config, ConfigOverrides};
use common::config_test_utils::with_config_env;

//============
// Precedence
//============

#[test]
fn precedence_defaults_file_env_cli() {
    with_config_env(
        r#"
        [server]
        port = 1111
        "#,
        || {
            std::env::set_var("BLOCKDROP_SERVER__PORT", "2222");

            let overrides = ConfigOverrides {
                port: Some(3333),
                ..Default::default()
            };

            let config = load_config().expect("load config");
            let config = apply_overrides(config, &overrides);
            assert_eq!(config.server.port, 3333);
        },
    );
}

#[test]
fn env_beats_file() {
    with_config_env(
        r#"
        [server]
        port = 1111
        "#,
        || {
            std::env::set_var("BLOCKDROP_SERVER__PORT", "2222");
            let config = load_config().expect("load config");
            assert_eq!(config.server.port, 2222);
        },
    );
}

#[test]
fn file_beats_defaults() {
    with_config_env(
        r#"
        [upload]
        max_upload_mb = 5

        [sessions]
        inactivity_timeout_secs = 90
        "#,
        || {
            let config = load_config().expect("load config");
            assert_eq!(config.upload.max_upload_mb, 5);
            assert_eq!(config.sessions.inactivity_timeout_secs, 90);
            assert_eq!(config.server.port, 8420);
        },
    );
}

#[test]
fn empty_file_gives_defaults() {
    with_config_env("", || {
        let config = load_config().expect("load config");
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.upload.max_upload_mb, 2048);
        assert_eq!(config.upload.failed_login_delay_ms, 500);
        assert!(!config.test_mode.enabled);
        assert!(config.users.is_empty());
    });
}

#[test]
fn users_table_is_loaded() {
    with_config_env(
        r#"
        [[users]]
        id = "alice"
        password_sha256 = "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        max_upload_mb = 10
        "#,
        || {
            let config = load_config().expect("load config");
            assert_eq!(config.users.len(), 1);
            assert_eq!(config.users[0].id, "alice");
            assert_eq!(config.users[0].max_upload_mb, Some(10));
        },
    );
}

#[test]
fn cli_test_mode_flag_enables_test_mode() {
    with_config_env("", || {
        let overrides = ConfigOverrides {
            test_mode: true,
            storage_root: Some("/tmp/blockdrop-test".into()),
            ..Default::default()
        };
        let config = apply_overrides(load_config().expect("load config"), &overrides);
        assert!(config.test_mode.enabled);
        assert_eq!(config.storage.root, std::path::PathBuf::from("/tmp/blockdrop-test"));
    });
}

//============
// Validation
//============

#[test]
fn zero_inactivity_timeout_is_rejected() {
    with_config_env(
        r#"
        [sessions]
        inactivity_timeout_secs = 0
        "#,
        || {
            let err = load_config().expect_err("should reject");
            assert!(err.to_string().contains("inactivity_timeout_secs"));
        },
    );
}

#[test]
fn oversize_block_limit_is_rejected() {
    with_config_env(
        r#"
        [upload]
        max_block_bytes = 1073741824
        "#,
        || {
            let err = load_config().expect_err("should reject");
            assert!(err.to_string().contains("max_block_bytes"));
        },
    );
}

#[test]
fn malformed_password_digest_is_rejected() {
    with_config_env(
        r#"
        [[users]]
        id = "alice"
        password_sha256 = "plaintext"
        "#,
        || {
            let err = load_config().expect_err("should reject");
            assert!(err.to_string().contains("password_sha256"));
        },
    );
}

#[test]
fn env_value_is_validated_too() {
    with_config_env("", || {
        std::env::set_var("BLOCKDROP_UPLOAD__MAX_UPLOAD_MB", "0");
        let err = load_config().expect_err("should reject");
        assert!(err.to_string().contains("max_upload_mb"));
    });
}
