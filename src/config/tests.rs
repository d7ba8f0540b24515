use std::path::Path;

use clap::Parser;

use super::*;

fn settings(raw: RawSettings) -> Settings {
    Settings::from_raw(raw).expect("valid settings")
}

#[test]
fn defaults_match_documented_values() {
    let settings = settings(RawSettings::default());

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.capacity.get(), 10_000);
    assert!(!settings.cache.development);
    assert!(settings.cache.dev_cache_enabled);
    assert_eq!(settings.sync.region, "us-east-2");
    assert_eq!(settings.sync.bucket_name, None);
    assert_eq!(settings.sync.stability_threshold, Duration::from_millis(300));
    assert_eq!(settings.sync.poll_interval, Duration::from_millis(100));
    assert!(!settings.sync.ignore_initial);
    assert_eq!(settings.sync.recent_changes_limit.get(), 50);
    assert_eq!(settings.storage.root, Path::new("storage"));
}

#[test]
fn sandbox_root_defaults_to_current_dir() {
    let settings = settings(RawSettings::default());
    assert_eq!(
        settings.sync.sandbox_root,
        std::env::current_dir().expect("cwd")
    );
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.sync.bucket_name = Some("from-file".to_string());

    raw.apply_global_overrides(&GlobalOverrides {
        log_level: Some("debug".to_string()),
        log_json: Some(true),
        sandbox_root: Some(PathBuf::from("/home/dev/templates")),
        ..Default::default()
    });
    raw.apply_sync_target(&SyncTarget {
        dir: PathBuf::from("/home/dev/templates/shop"),
        store_id: "s1".to_string(),
        bucket: Some("from-cli".to_string()),
        region: None,
    });
    let settings = settings(raw);

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(settings.sync.sandbox_root, Path::new("/home/dev/templates"));
    assert_eq!(settings.sync.bucket_name.as_deref(), Some("from-cli"));
}

#[test]
fn blank_bucket_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.sync.bucket_name = Some("   ".to_string());
    assert_eq!(settings(raw).sync.bucket_name, None);
}

#[test]
fn zero_values_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.capacity = Some(0);
    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.capacity",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.sync.poll_interval_ms = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());
    let err = Settings::from_raw(raw).unwrap_err();
    assert!(err.to_string().contains("logging.level"));
}

#[test]
fn parse_watch_arguments() {
    let args = CliArgs::parse_from([
        "vitrina",
        "watch",
        "--dir",
        "/home/dev/templates/shop",
        "--store",
        "store9",
        "--bucket",
        "templates-dev",
        "--sync-all",
        "--log-level",
        "debug",
    ]);

    assert_eq!(args.overrides.log_level.as_deref(), Some("debug"));
    match args.command {
        Command::Watch(watch) => {
            assert_eq!(watch.target.store_id, "store9");
            assert_eq!(watch.target.bucket.as_deref(), Some("templates-dev"));
            assert!(watch.sync_all);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_plan_arguments() {
    let args = CliArgs::parse_from([
        "vitrina",
        "plan",
        "--change-type",
        "collection_deleted",
        "--store",
        "store1",
        "--entity",
        "col42",
    ]);

    match args.command {
        Command::Plan(plan) => {
            assert_eq!(plan.change_type, "collection_deleted");
            assert_eq!(plan.entity_id.as_deref(), Some("col42"));
            assert_eq!(plan.path, None);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn sync_command_suppresses_initial_scan() {
    let args = CliArgs::parse_from([
        "vitrina",
        "sync",
        "--dir",
        "/tmp/theme",
        "--store",
        "s1",
        "--bucket",
        "b",
    ]);
    let settings = load(&args).expect("valid settings");
    assert!(settings.sync.ignore_initial);
    assert_eq!(settings.sync.bucket_name.as_deref(), Some("b"));
}
