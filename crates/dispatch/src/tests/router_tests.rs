use std::time::Instant as StdInstant;

use super::*;
use crate::{
    edge::EdgeEvent,
    test_support::{RecordingBacklight, RecordingConsole, RecordingDisplay},
};
use shared::domain::{CommandSpec, MenuOptionSpec, MenuSpec};

const TIMEOUT: Duration = Duration::from_secs(30);

struct Harness {
    router: Arc<DispatchRouter>,
    display: Arc<RecordingDisplay>,
    console: Arc<RecordingConsole>,
    backlight: Arc<RecordingBacklight>,
}

fn option(button: u8, label: &str, action: &str) -> MenuOptionSpec {
    MenuOptionSpec {
        button: ButtonId(button),
        label: label.into(),
        description: String::new(),
        action: action.into(),
    }
}

fn harness() -> Harness {
    let display = RecordingDisplay::shared();
    let console = RecordingConsole::shared();
    let backlight = RecordingBacklight::shared();

    let runner = ActionRunner::new(console.clone());
    let mut router = DispatchRouter::new(runner, display.clone(), console.clone(), Duration::ZERO)
        .with_backlight(backlight.clone());

    for spec in [
        MenuSpec {
            id: MenuId::new("pihole"),
            title: "Pi-Hole Update Menu".into(),
            options: vec![option(2, "Quick", "quick"), option(3, "Missing", "missing")],
        },
        MenuSpec {
            id: MenuId::new("system"),
            title: "System Control Menu".into(),
            options: vec![option(2, "Quick", "quick"), option(3, "Broken", "broken")],
        },
    ] {
        router.add_menu(MenuController::new(
            &spec,
            TIMEOUT,
            Duration::ZERO,
            display.clone(),
            console.clone(),
        ));
    }

    router.add_action("quick", ActionSpec::single("Quick", CommandSpec::new("true", Vec::<String>::new())));
    router.add_action("broken", ActionSpec::single("Broken", CommandSpec::new("false", Vec::<String>::new())));
    router.add_action(
        "slow",
        ActionSpec::single("Slow", CommandSpec::new("sh", ["-c", "sleep 1"])),
    );

    router.register(
        ButtonId(1),
        Binding::CycleBrightness,
        Some(Binding::Arm(MenuId::new("pihole"))),
    );
    router.register(ButtonId(2), Binding::None, Some(Binding::Arm(MenuId::new("system"))));
    router.register(ButtonId(3), Binding::Run("slow".into()), None);
    router.register(ButtonId(4), Binding::RefreshDisplay, Some(Binding::None));

    Harness {
        router: Arc::new(router),
        display,
        console,
        backlight,
    }
}

fn press(button: u8) -> ButtonEvent {
    ButtonEvent::Press(PressEvent {
        button: ButtonId(button),
    })
}

fn hold(button: u8) -> ButtonEvent {
    ButtonEvent::Hold(HoldEvent {
        button: ButtonId(button),
        duration: Duration::from_secs(3),
    })
}

#[tokio::test(start_paused = true)]
async fn idle_press_cycles_brightness() {
    let h = harness();

    let outcome = h.router.dispatch(press(1)).await;

    assert!(matches!(outcome, RouteOutcome::BrightnessChanged(_)));
    assert_eq!(h.backlight.steps(), 1);
    assert!(h.display.prompts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn idle_press_refreshes_display() {
    let h = harness();

    assert_eq!(h.router.dispatch(press(4)).await, RouteOutcome::DisplayRefreshed);
    assert_eq!(h.display.defaults(), 1);
}

#[tokio::test(start_paused = true)]
async fn unbound_events_are_ignored() {
    let h = harness();

    assert_eq!(h.router.dispatch(press(2)).await, RouteOutcome::Ignored);
    assert_eq!(h.router.dispatch(hold(3)).await, RouteOutcome::Ignored);
    assert_eq!(h.router.dispatch(hold(4)).await, RouteOutcome::Ignored);
}

#[tokio::test(start_paused = true)]
async fn hold_arms_bound_menu() {
    let h = harness();

    assert_eq!(
        h.router.dispatch(hold(2)).await,
        RouteOutcome::Armed(MenuId::new("system"))
    );
    assert_eq!(h.router.armed_menu().await, Some(MenuId::new("system")));
    assert_eq!(h.display.prompts(), vec![MenuId::new("system")]);
}

#[tokio::test(start_paused = true)]
async fn second_menu_cannot_arm_while_first_is_armed() {
    let h = harness();
    h.router.dispatch(hold(1)).await;

    let outcome = h.router.request_arm(&MenuId::new("system")).await;

    assert_eq!(
        outcome,
        RouteOutcome::ArmRefused {
            menu: MenuId::new("system"),
            reason: ArmRefusal::AnotherMenuArmed,
        }
    );
    assert_eq!(h.router.armed_menu().await, Some(MenuId::new("pihole")));
    assert_eq!(h.display.prompts(), vec![MenuId::new("pihole")]);
}

#[tokio::test(start_paused = true)]
async fn unknown_menu_is_refused() {
    let h = harness();

    let outcome = h.router.request_arm(&MenuId::new("network")).await;

    assert_eq!(
        outcome,
        RouteOutcome::ArmRefused {
            menu: MenuId::new("network"),
            reason: ArmRefusal::UnknownMenu,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn brightness_button_cancels_armed_menu_without_stepping() {
    let h = harness();
    h.router.dispatch(hold(2)).await;

    let outcome = h.router.dispatch(press(1)).await;

    assert_eq!(outcome, RouteOutcome::Cancelled(MenuId::new("system")));
    assert_eq!(h.backlight.steps(), 0);
    assert_eq!(h.display.defaults(), 1);
    assert!(h.console.contains("Selection cancelled"));
    assert_eq!(h.router.armed_menu().await, None);
}

#[tokio::test(start_paused = true)]
async fn non_option_button_cancels_without_its_idle_binding() {
    let h = harness();
    h.router.dispatch(hold(2)).await;

    let outcome = h.router.dispatch(press(4)).await;

    assert_eq!(outcome, RouteOutcome::Cancelled(MenuId::new("system")));
    // the refresh binding did not run on top of the cancel
    assert_eq!(h.display.defaults(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_through_router_returns_to_idle() {
    let h = harness();
    h.router.dispatch(hold(2)).await;

    tokio::time::sleep(TIMEOUT + Duration::from_millis(1)).await;

    assert_eq!(h.router.armed_menu().await, None);
    assert_eq!(h.display.defaults(), 1);
    assert_eq!(h.router.dispatch(press(2)).await, RouteOutcome::Ignored);
}

#[tokio::test]
async fn confirmed_option_runs_action_and_restores_display() {
    let h = harness();
    h.router.dispatch(hold(2)).await;

    let outcome = h.router.dispatch(press(2)).await;
    assert_eq!(outcome, RouteOutcome::ActionStarted("quick".into()));

    let report = h.router.wait_for_action().await.expect("action report");
    assert!(report.succeeded());
    assert_eq!(h.display.defaults(), 1);
    assert!(h.console.contains("Quick selected"));
    assert!(h.console.contains("Quick completed successfully"));
    assert!(!h.router.runner().is_busy());
}

#[tokio::test]
async fn failed_action_still_restores_display() {
    let h = harness();
    h.router.dispatch(hold(2)).await;

    h.router.dispatch(press(3)).await;
    let report = h.router.wait_for_action().await.expect("action report");

    assert!(!report.succeeded());
    assert_eq!(h.display.defaults(), 1);
    assert!(h.console.contains("Broken failed (exit code 1)"));
}

#[tokio::test]
async fn missing_action_is_refused_and_display_restored() {
    let h = harness();
    h.router.dispatch(hold(1)).await;

    let outcome = h.router.dispatch(press(3)).await;

    assert_eq!(outcome, RouteOutcome::ActionRefused("missing".into()));
    assert_eq!(h.display.defaults(), 1);
    assert!(h.console.contains("unknown action 'missing'"));
    assert_eq!(h.router.armed_menu().await, None);
}

#[tokio::test]
async fn arm_is_refused_while_action_runs() {
    let h = harness();
    assert_eq!(
        h.router.dispatch(press(3)).await,
        RouteOutcome::ActionStarted("slow".into())
    );
    assert!(h.router.runner().is_busy());

    let outcome = h.router.dispatch(hold(2)).await;

    assert_eq!(
        outcome,
        RouteOutcome::ArmRefused {
            menu: MenuId::new("system"),
            reason: ArmRefusal::ActionRunning,
        }
    );
    assert!(h.display.prompts().is_empty());

    // brightness stays responsive during the action
    assert!(matches!(
        h.router.dispatch(press(1)).await,
        RouteOutcome::BrightnessChanged(_)
    ));
    // a second direct run is refused rather than queued
    assert_eq!(
        h.router.dispatch(press(3)).await,
        RouteOutcome::ActionRefused("slow".into())
    );

    let report = h.router.wait_for_action().await.expect("action report");
    assert!(report.succeeded());
    assert_eq!(
        h.router.dispatch(hold(2)).await,
        RouteOutcome::Armed(MenuId::new("system"))
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_timers_and_releases_backlight() {
    let h = harness();
    h.router.dispatch(hold(2)).await;

    h.router.shutdown().await;
    tokio::time::sleep(TIMEOUT * 2).await;

    assert_eq!(h.router.armed_menu().await, None);
    assert_eq!(h.display.defaults(), 0);
    assert!(!h.console.contains("Selection timed out"));
    assert_eq!(h.backlight.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn detectors_classify_holds_only_for_hold_bound_buttons() {
    let h = harness();
    let hold_threshold = Duration::from_secs(2);
    let descriptor = |id| {
        ButtonDescriptor::new(ButtonId(id), Duration::from_millis(50)).with_hold(hold_threshold, false)
    };
    let mut brightness = h.router.detector(descriptor(1));
    let mut run_only = h.router.detector(descriptor(3));

    let t0 = StdInstant::now();
    let t1 = t0 + Duration::from_secs(3);
    brightness.on_edge(EdgeEvent::pressed(t0));
    run_only.on_edge(EdgeEvent::pressed(t0));

    assert!(matches!(
        brightness.on_edge(EdgeEvent::released(t1)),
        Some(ButtonEvent::Hold(_))
    ));
    assert!(matches!(
        run_only.on_edge(EdgeEvent::released(t1)),
        Some(ButtonEvent::Press(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn run_loop_drains_channel_until_closed() {
    let h = harness();
    let (sink, rx) = ChannelSink::channel(8);

    sink.deliver(press(1));
    sink.deliver(press(1));
    drop(sink);
    h.router.clone().run(rx).await;

    assert_eq!(h.backlight.steps(), 2);
}

#[tokio::test(start_paused = true)]
async fn full_channel_drops_events() {
    let (sink, mut rx) = ChannelSink::channel(1);

    sink.deliver(press(1));
    sink.deliver(press(2));
    drop(sink);

    assert_eq!(rx.recv().await, Some(press(1)));
    assert_eq!(rx.recv().await, None);
}
