use super::*;

/// # Safety
/// Env mutation is process-wide; only this test touches the `ITOUCH_*` keys.
unsafe fn clear_itouch_env() {
    unsafe {
        std::env::remove_var("ITOUCH_HOST");
        std::env::remove_var("ITOUCH_PORT");
        std::env::remove_var("ITOUCH_PATH");
        std::env::remove_var("ITOUCH_AUTO_RECONNECT");
        std::env::remove_var("ITOUCH_RECONNECT_DELAY_MS");
        std::env::remove_var("ITOUCH_MAX_RECONNECT_ATTEMPTS");
        std::env::remove_var("ITOUCH_TIMEOUT_SECS");
    }
}

#[test]
fn default_values_match_constants() {
    let cfg = ClientConfig::default();
    assert_eq!(cfg.host, DEFAULT_HOST);
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert!(cfg.auto_reconnect);
    assert_eq!(cfg.reconnect_delay, Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS));
    assert_eq!(cfg.max_reconnect_attempts, DEFAULT_MAX_RECONNECT_ATTEMPTS);
    assert_eq!(cfg.default_timeout_secs, DEFAULT_TIMEOUT_SECS);
}

#[test]
fn url_builds_ws_target() {
    let cfg = ClientConfig {
        host: "192.168.31.15".to_owned(),
        ..ClientConfig::default()
    };
    assert_eq!(cfg.url(), "ws://192.168.31.15:23188");
}

#[test]
fn url_normalizes_path_slash() {
    let mut cfg = ClientConfig {
        path: "ws".to_owned(),
        ..ClientConfig::default()
    };
    assert_eq!(cfg.url(), "ws://127.0.0.1:23188/ws");
    cfg.path = "/ws".to_owned();
    assert_eq!(cfg.url(), "ws://127.0.0.1:23188/ws");
}

#[test]
fn from_env_reads_overrides_and_ignores_garbage() {
    unsafe {
        clear_itouch_env();
        std::env::set_var("ITOUCH_HOST", "10.0.0.2");
        std::env::set_var("ITOUCH_PORT", "9000");
        std::env::set_var("ITOUCH_AUTO_RECONNECT", "false");
        std::env::set_var("ITOUCH_RECONNECT_DELAY_MS", "250");
        std::env::set_var("ITOUCH_MAX_RECONNECT_ATTEMPTS", "not-a-number");
        std::env::set_var("ITOUCH_TIMEOUT_SECS", " 0 ");
    }

    let cfg = ClientConfig::from_env();
    assert_eq!(cfg.host, "10.0.0.2");
    assert_eq!(cfg.port, 9000);
    assert!(!cfg.auto_reconnect);
    assert_eq!(cfg.reconnect_delay, Duration::from_millis(250));
    assert_eq!(cfg.max_reconnect_attempts, DEFAULT_MAX_RECONNECT_ATTEMPTS);
    assert_eq!(cfg.default_timeout_secs, 0);

    unsafe { clear_itouch_env() };
    assert_eq!(ClientConfig::from_env(), ClientConfig::default());
}
