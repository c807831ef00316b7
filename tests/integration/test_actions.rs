//! Integration Tests for Click and Scroll Actions

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use modbar::models::{EventKind, Interval, ModuleSpec};
use modbar::{DispatchOutcome, Engine, EngineSettings, ModuleStatus, SourceRegistry};
use test_utils::{settle, wait_for_status, wait_for_text, MockRunner, Script};

fn start(specs: Vec<ModuleSpec>, runner: &MockRunner, settings: EngineSettings) -> Engine {
    Engine::with_modules(specs, settings, Arc::new(runner.clone()), SourceRegistry::new()).unwrap()
}

fn on_demand(id: &str, command: &str) -> ModuleSpec {
    let mut spec = ModuleSpec::new(id).with_exec(command);
    spec.interval = Some(Interval::Once);
    spec
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_does_not_wait_for_action() {
    let runner = MockRunner::new();
    runner.on("tick", Script::output("t"));
    runner.on("slow-action", Script::slow("", Duration::from_secs(10)));

    let spec = ModuleSpec::new("custom/clock")
        .with_exec("tick")
        .with_interval(Duration::from_secs(1))
        .with_action(EventKind::ClickMiddle, "slow-action");
    let engine = start(vec![spec], &runner, EngineSettings::default());
    wait_for_text(&engine.store(), "custom/clock").await;

    let before = tokio::time::Instant::now();
    assert_eq!(
        engine.dispatch("custom/clock", EventKind::ClickMiddle),
        DispatchOutcome::Fired
    );
    assert_eq!(tokio::time::Instant::now(), before);

    // polling continues while the action runs
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(runner.count("slow-action"), 1);
    assert!(runner.count("tick") >= 4);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_action_refreshes_module_after_it_finishes() {
    let runner = MockRunner::new();
    runner.then("mute-state", Script::output("on"));
    runner.on("mute-state", Script::output("muted"));
    runner.on("toggle-mute", Script::slow("", Duration::from_millis(500)));

    let spec = on_demand("custom/mute", "mute-state").with_action(EventKind::ClickLeft, "toggle-mute");
    let engine = start(vec![spec], &runner, EngineSettings::default());
    let store = engine.store();
    wait_for_text(&store, "custom/mute").await;

    assert_eq!(engine.dispatch("custom/mute", EventKind::ClickLeft), DispatchOutcome::Fired);
    settle().await;
    assert_eq!(runner.count("mute-state"), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(runner.count("mute-state"), 2);
    assert_eq!(store.get("custom/mute").unwrap().text, "muted");

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exec_on_event_false_skips_refresh() {
    let runner = MockRunner::new();
    runner.on("state", Script::output("s"));
    runner.on("act", Script::output(""));

    let mut spec = on_demand("custom/quiet", "state").with_action(EventKind::ScrollUp, "act");
    spec.exec_on_event = false;
    let engine = start(vec![spec], &runner, EngineSettings::default());
    wait_for_text(&engine.store(), "custom/quiet").await;

    assert_eq!(engine.dispatch("custom/quiet", EventKind::ScrollUp), DispatchOutcome::Fired);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(runner.count("act"), 1);
    assert_eq!(runner.count("state"), 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failing_action_leaves_module_alone() {
    let runner = MockRunner::new();
    runner.on("state", Script::output("fine"));
    runner.on("broken", Script::fail(127));

    let mut spec = on_demand("custom/m", "state").with_action(EventKind::ClickRight, "broken");
    spec.exec_on_event = false;
    let engine = start(vec![spec], &runner, EngineSettings::default());
    let store = engine.store();
    wait_for_text(&store, "custom/m").await;

    assert_eq!(engine.dispatch("custom/m", EventKind::ClickRight), DispatchOutcome::Fired);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let state = store.get("custom/m").unwrap();
    assert_eq!(state.text, "fine");
    assert!(!state.error);
    assert_eq!(store.status("custom/m"), Some(ModuleStatus::Active));

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_action_timeout_is_enforced() {
    let runner = MockRunner::new();
    runner.on("forever", Script::slow("", Duration::from_secs(3600)));

    let spec = ModuleSpec::new("custom/btn")
        .with_format("go")
        .with_action(EventKind::ClickLeft, "forever");
    let settings = EngineSettings {
        action_timeout: Duration::from_secs(2),
        ..EngineSettings::default()
    };
    let engine = start(vec![spec], &runner, settings);
    wait_for_status(&engine.store(), "custom/btn", ModuleStatus::Active).await;

    assert_eq!(engine.dispatch("custom/btn", EventKind::ClickLeft), DispatchOutcome::Fired);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(runner.max_concurrent("forever"), 1);

    // the timed-out run is over, so a second click starts a fresh one alone
    assert_eq!(engine.dispatch("custom/btn", EventKind::ClickLeft), DispatchOutcome::Fired);
    settle().await;
    assert_eq!(runner.count("forever"), 2);
    assert_eq!(runner.max_concurrent("forever"), 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_left_click_toggles_alternate_format() {
    let runner = MockRunner::new();
    runner.on("bat", Script::output("80"));

    let mut spec = on_demand("custom/bat", "bat").with_format("{}%");
    spec.format_alt = Some("battery {}%".to_string());
    let engine = start(vec![spec], &runner, EngineSettings::default());
    let store = engine.store();
    wait_for_text(&store, "custom/bat").await;
    assert_eq!(store.get("custom/bat").unwrap().label, "80%");

    assert_eq!(
        engine.dispatch("custom/bat", EventKind::ClickLeft),
        DispatchOutcome::ToggledAlt
    );
    settle().await;
    let state = store.get("custom/bat").unwrap();
    assert_eq!(state.label, "battery 80%");
    assert!(state.alt_format);

    engine.dispatch("custom/bat", EventKind::ClickLeft);
    settle().await;
    assert_eq!(store.get("custom/bat").unwrap().label, "80%");

    // toggling does not re-run the command
    assert_eq!(runner.count("bat"), 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unbound_and_unknown_targets() {
    let runner = MockRunner::new();
    let spec = ModuleSpec::new("custom/label")
        .with_format("hi")
        .with_action(EventKind::ClickLeft, "launch");
    runner.on("launch", Script::output(""));
    let engine = start(vec![spec], &runner, EngineSettings::default());
    wait_for_status(&engine.store(), "custom/label", ModuleStatus::Active).await;

    assert_eq!(
        engine.dispatch("custom/label", EventKind::ScrollDown),
        DispatchOutcome::Unbound
    );
    assert_eq!(
        engine.dispatch("custom/missing", EventKind::ClickLeft),
        DispatchOutcome::UnknownModule
    );
    settle().await;
    assert!(runner.calls().is_empty());

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_right_click_with_only_left_binding_runs_nothing() {
    let runner = MockRunner::new();
    runner.on("launch", Script::output(""));

    let spec = ModuleSpec::new("custom/menu")
        .with_format("menu")
        .with_action(EventKind::ClickLeft, "launch");
    let engine = start(vec![spec], &runner, EngineSettings::default());
    wait_for_status(&engine.store(), "custom/menu", ModuleStatus::Active).await;

    assert_eq!(
        engine.dispatch("custom/menu", EventKind::ClickRight),
        DispatchOutcome::Unbound
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(runner.calls().is_empty());
    assert_eq!(engine.store().get("custom/menu").unwrap().label, "menu");

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_running_actions() {
    let runner = MockRunner::new();
    runner.on("long", Script::slow("", Duration::from_secs(3600)));

    let spec = ModuleSpec::new("custom/b")
        .with_format("b")
        .with_action(EventKind::ClickLeft, "long");
    let engine = start(vec![spec], &runner, EngineSettings::default());
    wait_for_status(&engine.store(), "custom/b", ModuleStatus::Active).await;

    engine.dispatch("custom/b", EventKind::ClickLeft);
    settle().await;

    let started = tokio::time::Instant::now();
    engine.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
}
