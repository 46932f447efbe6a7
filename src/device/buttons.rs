//! Fixed physical-position actions

/// Actions available while the FN key is held, or from the config buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalAction {
    Sleep,
    ToggleBootMode,
    ToggleOutputLock,
    ToggleCaffeinated,
    SwitchOutputMode,
    NextLayout,
    ToggleScreenInvert,
    ToggleScreenDisabled,
}

impl GlobalAction {
    pub fn label(self) -> &'static str {
        match self {
            GlobalAction::Sleep => "Sleep",
            GlobalAction::ToggleBootMode => "Config Mode",
            GlobalAction::ToggleOutputLock => "Output Lock",
            GlobalAction::ToggleCaffeinated => "Caffeinated",
            GlobalAction::SwitchOutputMode => "Output Mode",
            GlobalAction::NextLayout => "Next Layout",
            GlobalAction::ToggleScreenInvert => "Invert Screen",
            GlobalAction::ToggleScreenDisabled => "Screen Off",
        }
    }
}

/// (row, col) -> action while FN is held
pub const GLOBAL_ACTIONS: [((usize, usize), GlobalAction); 8] = [
    ((0, 0), GlobalAction::ToggleBootMode),
    ((1, 0), GlobalAction::Sleep),
    ((0, 1), GlobalAction::ToggleOutputLock),
    ((0, 2), GlobalAction::ToggleCaffeinated),
    ((0, 3), GlobalAction::SwitchOutputMode),
    ((0, 4), GlobalAction::NextLayout),
    ((1, 1), GlobalAction::ToggleScreenInvert),
    ((1, 2), GlobalAction::ToggleScreenDisabled),
];

pub fn global_action_at(row: usize, col: usize) -> Option<GlobalAction> {
    GLOBAL_ACTIONS
        .iter()
        .find(|(pos, _)| *pos == (row, col))
        .map(|(_, action)| *action)
}

/// Config button short press actions, by button index
pub const CONFIG_BUTTON_SHORT: [GlobalAction; 2] =
    [GlobalAction::NextLayout, GlobalAction::SwitchOutputMode];

/// Config button long press actions, by button index
pub const CONFIG_BUTTON_LONG: [GlobalAction; 2] =
    [GlobalAction::ToggleBootMode, GlobalAction::ToggleCaffeinated];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_unique() {
        for (i, (a, _)) in GLOBAL_ACTIONS.iter().enumerate() {
            for (b, _) in &GLOBAL_ACTIONS[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(global_action_at(1, 0), Some(GlobalAction::Sleep));
        assert_eq!(global_action_at(0, 0), Some(GlobalAction::ToggleBootMode));
        assert_eq!(global_action_at(4, 6), None);
    }
}
