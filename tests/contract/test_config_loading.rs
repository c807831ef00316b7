//! Contract Tests for Configuration Loading

use std::fs;
use std::time::Duration;

use modbar::config::loader::{ConfigFormat, ConfigLoader};
use modbar::config::Position;
use modbar::models::{EventKind, FormatIcons, Interval, ReturnType, Trigger};
use modbar::Error;
use tempfile::tempdir;

const JSONC_CONFIG: &str = r#"
{
    "layer": "top", // render-layer keys are ignored
    "modules-left": ["custom/launcher"],
    "modules-center": ["custom/media"],
    "modules-right": ["custom/updates", "clock"],

    /* scripts */
    "custom/launcher": {
        "format": "",
        "on-click": "rofi -show drun",
        "tooltip": false
    },
    "custom/media": {
        "format": "{icon} {}",
        "return-type": "json",
        "max-length": 40,
        "escape": true,
        "format-icons": {"spotify": "", "default": "🎜"},
        "exec": "$HOME/.config/waybar/mediaplayer.py 2> /dev/null",
        "on-click": "playerctl play-pause",
        "on-scroll-up": "playerctl next",
        "restart-interval": 2
    },
    "custom/updates": {
        "exec": "checkupdates | wc -l",
        "exec-if": "which checkupdates",
        "interval": 3600,
        "signal": 8
    },
    "clock": {"format": "{:%H:%M}"},
    "engine": {"exec-timeout": 10}
}
"#;

#[test]
fn test_load_jsonc_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.jsonc");
    fs::write(&path, JSONC_CONFIG).unwrap();

    let config = ConfigLoader::load_from_path(&path).unwrap();
    assert_eq!(config.engine.exec_timeout, Duration::from_secs(10));

    let layout = config.layout();
    assert_eq!(layout.position_of("custom/media"), Some(Position::Center));
    assert_eq!(
        layout.modules(),
        vec!["custom/launcher", "custom/media", "custom/updates", "clock"]
    );

    let specs = config.module_specs();
    assert_eq!(specs.len(), 4);

    let launcher = &specs[0];
    assert_eq!(launcher.trigger(), Trigger::EventOnly);
    assert!(!launcher.tooltip);
    assert_eq!(launcher.actions.get(EventKind::ClickLeft), Some("rofi -show drun"));

    let media = &specs[1];
    assert_eq!(media.trigger(), Trigger::Continuous);
    assert_eq!(media.return_type, ReturnType::Json);
    assert_eq!(media.max_length, Some(40));
    assert!(media.escape);
    assert!(matches!(media.format_icons, Some(FormatIcons::Keyed { .. })));
    assert_eq!(media.actions.len(), 2);
    assert_eq!(media.restart_interval, Some(Duration::from_secs(2)));

    let updates = &specs[2];
    assert_eq!(updates.interval, Some(Interval::Every(Duration::from_secs(3600))));
    assert_eq!(updates.exec_if.as_deref(), Some("which checkupdates"));
    assert_eq!(updates.signal, Some(8));

    assert_eq!(specs[3].builtin_name(), Some("clock"));
}

#[test]
fn test_load_toml_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
modules-right = ["custom/uptime"]

["custom/uptime"]
exec = "uptime -p"
interval = "once"
on-click-right = "notify-send up"

[engine]
max-restarts = 2
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_path(&path).unwrap();
    assert_eq!(config.engine.max_restarts, 2);

    let specs = config.module_specs();
    assert_eq!(specs[0].interval, Some(Interval::Once));
    assert!(specs[0].polls_at_start());
    assert_eq!(
        specs[0].actions.get(EventKind::ClickRight),
        Some("notify-send up")
    );
}

#[test]
fn test_invalid_modules_are_reported_not_fatal() {
    let config = ConfigLoader::parse(
        r#"{
            "modules-left": ["custom/a", "custom/b", "custom/c"],
            "custom/a": {"exec": "date", "interval": 5},
            "custom/b": {"exec": "date", "return-type": "yaml"},
            "custom/c": {"exec": "date", "signal": 99}
        }"#,
        ConfigFormat::Json,
    )
    .unwrap();

    let (specs, errors) = config.try_module_specs();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].id, "custom/a");

    let fields: Vec<String> = errors
        .iter()
        .filter_map(|e| match e {
            Error::ConfigValidationFailed { field, .. } => Some(field.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(fields, vec!["custom/b.return-type", "custom/c.signal"]);
}

#[test]
fn test_malformed_file_is_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ \"modules-left\": [ }").unwrap();

    assert!(matches!(
        ConfigLoader::load_from_path(&path),
        Err(Error::ConfigParseFailed { .. })
    ));
}

#[test]
fn test_search_path_order() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    fs::write(second.path().join("config"), "{}").unwrap();

    let mut loader = ConfigLoader::new();
    loader.set_search_path(first.path().to_path_buf());
    loader.add_search_path(second.path().to_path_buf());
    assert_eq!(loader.find_config_path(), Some(second.path().join("config")));

    fs::write(first.path().join("config.toml"), "").unwrap();
    assert_eq!(
        loader.find_config_path(),
        Some(first.path().join("config.toml"))
    );
}
