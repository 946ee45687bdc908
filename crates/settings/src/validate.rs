use std::collections::{BTreeSet, HashSet};

use shared::{
    domain::{Binding, ButtonId},
    error::ConfigFault,
};

use crate::Settings;

/// Checks cross-references and ranges. Every failure is fatal at startup.
pub fn validate(settings: &Settings) -> Result<(), ConfigFault> {
    let mut ids = BTreeSet::new();
    let mut pins = HashSet::new();
    for button in &settings.buttons {
        if !button.id.is_valid_slot() {
            return Err(ConfigFault::invalid(format!(
                "button id {} is outside {}..={}",
                button.id.0,
                ButtonId::MIN,
                ButtonId::MAX
            )));
        }
        if !ids.insert(button.id) {
            return Err(ConfigFault::invalid(format!("{} is configured twice", button.id)));
        }
        if !pins.insert(button.pin) {
            return Err(ConfigFault::invalid(format!(
                "pin {} is used by more than one button",
                button.pin
            )));
        }
        if button.debounce_ms == 0 {
            return Err(ConfigFault::invalid(format!(
                "{} needs a positive debounce",
                button.id
            )));
        }
        if button.hold_binding().is_some() && !button.hold_ms.is_some_and(|ms| ms > 0) {
            return Err(ConfigFault::invalid(format!(
                "{} has a hold binding but no hold threshold",
                button.id
            )));
        }
        for binding in std::iter::once(&button.press).chain(button.hold_binding()) {
            check_binding(settings, button.id, binding)?;
        }
    }

    let brightness = settings.brightness_button();
    let mut menu_ids = HashSet::new();
    for menu in &settings.menus {
        if !menu_ids.insert(menu.id.as_str()) {
            return Err(ConfigFault::invalid(format!("menu {} is defined twice", menu.id)));
        }
        if menu.options.is_empty() {
            return Err(ConfigFault::invalid(format!("menu {} has no options", menu.id)));
        }
        let mut option_buttons = HashSet::new();
        for option in &menu.options {
            if !ids.contains(&option.button) {
                return Err(ConfigFault::invalid(format!(
                    "menu {} offers {}, which is not configured",
                    menu.id, option.button
                )));
            }
            if Some(option.button) == brightness {
                return Err(ConfigFault::invalid(format!(
                    "menu {} may not use the brightness button {} as an option",
                    menu.id, option.button
                )));
            }
            if !option_buttons.insert(option.button) {
                return Err(ConfigFault::invalid(format!(
                    "menu {} binds {} twice",
                    menu.id, option.button
                )));
            }
            if !settings.actions.contains_key(&option.action) {
                return Err(ConfigFault::invalid(format!(
                    "menu {} option {} names unknown action {}",
                    menu.id, option.label, option.action
                )));
            }
        }
    }

    for (name, action) in &settings.actions {
        if action.steps.is_empty() {
            return Err(ConfigFault::invalid(format!("action {name} has no steps")));
        }
        if action.steps.iter().any(|step| step.program.trim().is_empty()) {
            return Err(ConfigFault::invalid(format!(
                "action {name} has a step without a program"
            )));
        }
    }

    if settings.timing.confirmation_timeout_secs == 0 {
        return Err(ConfigFault::invalid("confirmation timeout must be positive"));
    }
    let backlight = &settings.backlight;
    if backlight.enabled {
        if !(backlight.gamma.is_finite() && backlight.gamma > 0.0) {
            return Err(ConfigFault::invalid("backlight gamma must be positive"));
        }
        if backlight.retry_attempts == 0 {
            return Err(ConfigFault::invalid("backlight needs at least one attempt"));
        }
        if backlight.period_ns == 0 {
            return Err(ConfigFault::invalid("backlight period must be positive"));
        }
    }

    Ok(())
}

fn check_binding(settings: &Settings, button: ButtonId, binding: &Binding) -> Result<(), ConfigFault> {
    match binding {
        Binding::Arm(menu) if !settings.menus.iter().any(|spec| spec.id == *menu) => {
            Err(ConfigFault::invalid(format!("{button} arms unknown menu {menu}")))
        }
        Binding::Run(action) if !settings.actions.contains_key(action) => {
            Err(ConfigFault::invalid(format!("{button} runs unknown action {action}")))
        }
        _ => Ok(()),
    }
}
