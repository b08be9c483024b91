//! User-space hotplug notification (spec §6 Environment): spawns a
//! configured helper with `ACTION=add|remove DMNAME=<name>` on
//! `create`/`remove`. A no-op when no helper is configured — there is no
//! async process runtime in scope, so a plain blocking `std::process::Command`
//! spawn is enough; the helper is fire-and-forget, its exit status logged but
//! never propagated as a mapper error (a broken udev rule must not fail a
//! `create`).

use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Remove => "remove",
        }
    }
}

pub fn notify(helper: Option<&str>, action: Action, name: &str) {
    let Some(helper) = helper else {
        return;
    };

    let result = Command::new(helper)
        .env("ACTION", action.as_str())
        .env("DMNAME", name)
        .status();

    match result {
        Ok(status) if status.success() => {
            tracing::debug!(helper, action = action.as_str(), name, "hotplug helper ran");
        }
        Ok(status) => {
            tracing::warn!(
                helper,
                action = action.as_str(),
                name,
                ?status,
                "hotplug helper exited non-zero"
            );
        }
        Err(error) => {
            tracing::warn!(
                helper,
                action = action.as_str(),
                name,
                %error,
                "failed to spawn hotplug helper"
            );
        }
    }
}
