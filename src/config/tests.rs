use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.cache.ttl, Duration::from_secs(3600));
    assert!(settings.cache.url.is_none());
    assert_eq!(settings.uploads.max_request_bytes.get(), 10 * 1024 * 1024);
    assert_eq!(settings.uploads.max_image_bytes.get(), 5120 * 1024);
    assert_eq!(
        settings.uploads.public_base_url.as_str(),
        "http://127.0.0.1:8000/uploads/"
    );
    assert_eq!(settings.auth.token_ttl, time::Duration::minutes(60));
    assert_eq!(settings.auth.remember_ttl, time::Duration::weeks(1));
    assert_eq!(
        settings.auth.email_verification_ttl,
        time::Duration::minutes(60)
    );
}

#[test]
fn public_base_url_gains_trailing_slash() {
    let mut raw = RawSettings::default();
    raw.uploads.public_base_url = Some("https://cdn.sekolah.sch.id/files".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.uploads.public_base_url.as_str(),
        "https://cdn.sekolah.sch.id/files/"
    );
}

#[test]
fn zero_cache_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.ttl_seconds",
            ..
        }
    ));
}

#[test]
fn oversized_ttls_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(u64::MAX);
    assert!(matches!(
        Settings::from_raw(raw).expect_err("huge cache ttl"),
        LoadError::Invalid {
            key: "cache.ttl_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.auth.token_ttl_minutes = Some(u64::MAX);
    assert!(matches!(
        Settings::from_raw(raw).expect_err("huge token ttl"),
        LoadError::Invalid {
            key: "auth.token_ttl_minutes",
            ..
        }
    ));
}

#[test]
fn blank_cache_url_selects_memory_cache() {
    let mut raw = RawSettings::default();
    raw.cache.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.cache.url.is_none());
}

#[test]
fn image_limit_cannot_exceed_request_limit() {
    let mut raw = RawSettings::default();
    raw.uploads.max_request_bytes = Some(1024);
    raw.uploads.max_image_bytes = Some(2048);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["schoolboard"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_seed_arguments() {
    let args = CliArgs::parse_from([
        "schoolboard",
        "seed",
        "--database-url",
        "postgres://example",
        "--admin-email",
        "super@admin.com",
        "--admin-password",
        "password",
    ]);

    match args.command.expect("seed command") {
        Command::Seed(seed) => {
            assert_eq!(
                seed.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(seed.admin_email, "super@admin.com");
            assert_eq!(seed.admin_name, "Super Admin");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn migrate_accepts_database_override() {
    let mut raw = RawSettings::default();
    raw.apply_database_override(&DatabaseOverride {
        database_url: Some("postgres://migrate".to_string()),
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.database.url.as_deref(), Some("postgres://migrate"));
}
