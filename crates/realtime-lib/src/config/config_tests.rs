//
use super::*;
use figment::Jail;

#[test]
fn test_settings_validation() {
    let settings = Settings::default();
    assert!(settings.validate().is_ok());

    // Test invalid log level
    let mut invalid = settings.clone();
    invalid.log_level = "loud".to_string();
    assert!(invalid.validate().is_err());

    // Test zero heartbeat
    let mut invalid = settings.clone();
    invalid.keepalive_interval_ms = 0;
    assert!(invalid.validate().is_err());

    // Test empty base URL
    let mut invalid = settings.clone();
    invalid.api_base_url = " ".to_string();
    assert!(invalid.validate().is_err());

    // Test backoff ceiling below the base interval
    let mut invalid = settings.clone();
    invalid.reconnect.exponential = true;
    invalid.reconnect.max_interval_ms = 10;
    assert!(invalid.validate().is_err());
}

#[test]
fn test_defaults_match_channel_contract() {
    let config = Settings::default().channel_config();
    assert!(config.secure);
    assert_eq!(config.keepalive_interval, Duration::from_secs(20));
    assert_eq!(config.reconnect, ReconnectPolicy::default());
}

#[test]
fn test_reconnect_policy_mapping() {
    let mut settings = Settings::default();
    settings.reconnect = ReconnectSettings {
        interval_ms: 250,
        max_attempts: 0,
        exponential: true,
        max_interval_ms: 4000,
    };
    let policy = settings.reconnect_policy();
    assert_eq!(policy.max_attempts, None);
    assert_eq!(
        policy.backoff,
        Backoff::Exponential {
            max_delay: Duration::from_secs(4)
        }
    );
    assert_eq!(policy.delay_for(3), Some(Duration::from_millis(1000)));
}

#[test]
fn test_load_settings() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            api_base_url = "https://staging.gympulse.app"
            keepalive_interval_ms = 5000
            log_level = "debug"

            [reconnect]
            interval_ms = 2000
            "#,
        )?;

        // Environment variable takes precedence
        jail.set_env("GYMPULSE_LOG_LEVEL", "warn");
        jail.set_env("GYMPULSE_RECONNECT__MAX_ATTEMPTS", "5");

        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.api_base_url, "https://staging.gympulse.app");
        assert_eq!(settings.keepalive_interval_ms, 5000);
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.reconnect.interval_ms, 2000);
        assert_eq!(settings.reconnect.max_attempts, 5);
        // untouched fields keep their defaults
        assert!(settings.secure);
        assert_eq!(settings.gym_id_key, "gym_id");
        Ok(())
    });
}

#[test]
fn test_load_from_explicit_yaml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "realtime.yaml",
            "api_base_url: http://localhost:8000\nsecure: false\n",
        )?;

        let settings = Settings::load_from("realtime.yaml").map_err(|e| e.to_string())?;
        assert_eq!(settings.api_base_url, "http://localhost:8000");
        assert!(!settings.secure);
        Ok(())
    });
}

#[test]
fn test_load_rejects_invalid_values() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "keepalive_interval_ms = 0")?;
        let err = Settings::load().unwrap_err();
        assert!(matches!(err, RealtimeError::Config(_)));
        Ok(())
    });
}
