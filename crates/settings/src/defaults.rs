use std::collections::BTreeMap;

use shared::domain::{
    ActionSpec, Binding, ButtonId, CommandSpec, MenuId, MenuOptionSpec, MenuSpec, RecoveryProbe,
};

use crate::{
    BacklightSettings, ButtonSettings, DisplaySettings, GpioSettings, LoggingSettings, Settings,
    TimingSettings,
};

const HOLD_MS: u64 = 2_000;

impl Default for Settings {
    fn default() -> Self {
        Self {
            gpio: GpioSettings::default(),
            timing: TimingSettings::default(),
            display: DisplaySettings::default(),
            backlight: BacklightSettings::default(),
            logging: LoggingSettings::default(),
            buttons: stock_buttons(),
            menus: stock_menus(),
            actions: stock_actions(),
        }
    }
}

impl Default for GpioSettings {
    fn default() -> Self {
        Self {
            chip: "/dev/gpiochip0".into(),
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 30,
            settle_delay_secs: 3,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            session: "display".into(),
            dashboard_window: "padd".into(),
            control_window: "control".into(),
            dashboard_process: "padd.sh".into(),
        }
    }
}

impl Default for BacklightSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            pwm_chip: "/sys/class/pwm/pwmchip0".into(),
            channel: 0,
            period_ns: 1_000_000,
            gamma: 1.5,
            retry_attempts: 3,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}

fn button(id: u8, pin: u32, press: Binding, hold: Option<Binding>) -> ButtonSettings {
    ButtonSettings {
        id: ButtonId(id),
        pin,
        pull_up: true,
        debounce_ms: 50,
        hold_ms: hold.as_ref().map(|_| HOLD_MS),
        hold_repeat: false,
        press,
        hold,
    }
}

fn stock_buttons() -> Vec<ButtonSettings> {
    vec![
        button(
            1,
            17,
            Binding::CycleBrightness,
            Some(Binding::Arm(MenuId::new("pihole"))),
        ),
        button(2, 22, Binding::None, Some(Binding::Arm(MenuId::new("system")))),
        button(3, 23, Binding::None, None),
        button(4, 27, Binding::None, None),
    ]
}

fn option(button: u8, label: &str, description: &str, action: &str) -> MenuOptionSpec {
    MenuOptionSpec {
        button: ButtonId(button),
        label: label.into(),
        description: description.into(),
        action: action.into(),
    }
}

fn stock_menus() -> Vec<MenuSpec> {
    vec![
        MenuSpec {
            id: MenuId::new("pihole"),
            title: "Pi-Hole Update Menu".into(),
            options: vec![
                option(2, "Update Gravity", "press to update blocklists", "gravity"),
                option(3, "Update Pi-hole", "press to update core software", "pihole"),
                option(4, "Update PADD", "press to update dashboard code", "padd"),
            ],
        },
        MenuSpec {
            id: MenuId::new("system"),
            title: "System Control Menu".into(),
            options: vec![
                option(
                    2,
                    "Update System",
                    "press to update RPi OS and system packages",
                    "system_update",
                ),
                option(3, "Restart System", "press to reboot", "reboot"),
                option(
                    4,
                    "Shutdown System",
                    "press to shutdown, then power off",
                    "shutdown",
                ),
            ],
        },
    ]
}

fn sudo(args: &[&str]) -> CommandSpec {
    CommandSpec::new("sudo", args.iter().copied())
}

fn stock_actions() -> BTreeMap<String, ActionSpec> {
    let ftl_probe = RecoveryProbe {
        command: CommandSpec::new(
            "dig",
            ["+short", "+time=1", "+tries=1", "chaos", "txt", "local.api.ftl", "@localhost"],
        ),
        max_wait_secs: 30,
        interval_ms: 2_000,
    };

    let mut actions = BTreeMap::new();
    actions.insert(
        "gravity".to_string(),
        ActionSpec::single("Gravity update", sudo(&["pihole", "-g"])),
    );
    actions.insert(
        "pihole".to_string(),
        ActionSpec {
            recovery: Some(ftl_probe),
            ..ActionSpec::single("Pi-hole update", sudo(&["pihole", "-up"]))
        },
    );
    actions.insert(
        "padd".to_string(),
        ActionSpec {
            up_to_date_marker: Some("Already up to date".into()),
            ..ActionSpec::single(
                "PADD update",
                CommandSpec::new("git", ["pull"]).in_dir("/opt/padd"),
            )
        },
    );
    actions.insert(
        "system_update".to_string(),
        ActionSpec {
            label: "System update".into(),
            steps: vec![
                sudo(&["apt", "update"]),
                sudo(&["apt", "-y", "full-upgrade"]),
            ],
            restore_display: true,
            recovery: None,
            up_to_date_marker: None,
        },
    );
    actions.insert(
        "reboot".to_string(),
        ActionSpec::single("System restart", sudo(&["reboot"])),
    );
    actions.insert(
        "shutdown".to_string(),
        ActionSpec {
            restore_display: false,
            ..ActionSpec::single("System shutdown", sudo(&["shutdown", "-h", "now"]))
        },
    );
    actions
}
