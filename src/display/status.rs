//! Status screen composition

use serde::Serialize;

use crate::layout::LayoutTable;
use crate::state::{RuntimeFlags, BATTERY_UNKNOWN};

/// How long the apply banner stays up
pub const CONFIG_UPDATED_MS: u64 = 1_000;

/// Two lines of text: a header and a body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusScreen {
    pub header: String,
    pub body: String,
}

/// Header text for the battery state
pub fn battery_text(flags: &RuntimeFlags) -> String {
    if flags.is_charging() {
        "Charging".to_string()
    } else if flags.is_externally_powered() {
        "Plugged in".to_string()
    } else {
        match flags.battery_percentage() {
            BATTERY_UNKNOWN => "Reading battery...".to_string(),
            percent => format!("{}%", percent),
        }
    }
}

/// Builds the screen from runtime state
#[derive(Debug, Clone)]
pub struct StatusComposer {
    status_idle_ms: u64,
    /// Replaces the battery header in Config Mode
    network_line: Option<String>,
}

impl StatusComposer {
    pub fn new(status_idle_secs: u64) -> Self {
        Self {
            status_idle_ms: status_idle_secs * 1000,
            network_line: None,
        }
    }

    pub fn with_network_line(mut self, line: impl Into<String>) -> Self {
        self.network_line = Some(line.into());
        self
    }

    pub fn compose(
        &self,
        flags: &RuntimeFlags,
        layout: &LayoutTable,
        connected: bool,
        now_ms: u64,
    ) -> StatusScreen {
        let header = match &self.network_line {
            Some(line) => line.clone(),
            None => battery_text(flags),
        };
        StatusScreen {
            header,
            body: self.body(flags, layout, connected, now_ms),
        }
    }

    fn body(&self, flags: &RuntimeFlags, layout: &LayoutTable, connected: bool, now_ms: u64) -> String {
        if flags
            .config_updated_at()
            .is_some_and(|at| now_ms.saturating_sub(at) < CONFIG_UPDATED_MS)
        {
            return "Config Updated!".to_string();
        }
        if let Some(secs) = flags.reset_countdown() {
            return format!("Factory reset in {}s", secs);
        }
        if !connected {
            return "Connecting...".to_string();
        }

        let key_info = flags.key_info();
        if key_info.is_empty() || flags.idle_ms(now_ms) > self.status_idle_ms {
            format!("Layout: {}", layout.title)
        } else {
            key_info
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(title: &str) -> LayoutTable {
        let mut table = LayoutTable::build(&[], &[], 0);
        table.title = title.to_string();
        table
    }

    #[test]
    fn test_battery_text() {
        let flags = RuntimeFlags::new();
        assert_eq!(battery_text(&flags), "Reading battery...");
        flags.set_battery_percentage(57);
        assert_eq!(battery_text(&flags), "57%");
        flags.set_externally_powered(true);
        assert_eq!(battery_text(&flags), "Plugged in");
        flags.set_charging(true);
        assert_eq!(battery_text(&flags), "Charging");
    }

    #[test]
    fn test_body_priority() {
        let flags = RuntimeFlags::new();
        let composer = StatusComposer::new(5);
        let layout = table("Main");

        flags.touch(1_000);
        flags.set_key_info("A");
        assert_eq!(composer.compose(&flags, &layout, true, 1_500).body, "A");
        assert_eq!(
            composer.compose(&flags, &layout, false, 1_500).body,
            "Connecting..."
        );

        flags.set_reset_countdown(Some(2));
        assert_eq!(
            composer.compose(&flags, &layout, false, 1_500).body,
            "Factory reset in 2s"
        );

        flags.mark_config_updated(1_200);
        assert_eq!(
            composer.compose(&flags, &layout, false, 1_500).body,
            "Config Updated!"
        );
        assert_ne!(
            composer.compose(&flags, &layout, false, 2_200).body,
            "Config Updated!"
        );
    }

    #[test]
    fn test_idle_shows_layout() {
        let flags = RuntimeFlags::new();
        let composer = StatusComposer::new(5);
        let layout = table("Media");
        flags.touch(0);
        flags.set_key_info("Vol+");
        assert_eq!(composer.compose(&flags, &layout, true, 5_000).body, "Vol+");
        assert_eq!(
            composer.compose(&flags, &layout, true, 5_001).body,
            "Layout: Media"
        );
    }

    #[test]
    fn test_network_header_in_config_mode() {
        let flags = RuntimeFlags::new();
        let composer = StatusComposer::new(5).with_network_line("http://macropad.local:8080");
        let screen = composer.compose(&flags, &table("Main"), true, 0);
        assert_eq!(screen.header, "http://macropad.local:8080");
        assert_eq!(screen.body, "Layout: Main");
    }
}
