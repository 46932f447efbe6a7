//! Line-based stdin control of the simulated keypad

use std::io::BufRead;
use std::time::Duration;
use tracing::{info, warn};

use super::simulated::SimulatedKeypad;

const TAP_HOLD: Duration = Duration::from_millis(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Press(usize, usize),
    Release(usize, usize),
    Tap(usize, usize),
    Turn { clockwise: bool },
    Knob { pressed: bool },
    ConfigButton { button: usize, pressed: bool },
    ReleaseAll,
}

/// Parse one console line, e.g. `press 0 3`, `turn cw`, `cfg 1 down`
pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let position = |args: &[&str]| -> Result<(usize, usize), String> {
        match args {
            [r, c] => Ok((
                r.parse().map_err(|_| format!("bad row '{}'", r))?,
                c.parse().map_err(|_| format!("bad column '{}'", c))?,
            )),
            _ => Err("expected <row> <col>".to_string()),
        }
    };
    let updown = |word: &str| match word {
        "down" => Ok(true),
        "up" => Ok(false),
        other => Err(format!("expected down|up, got '{}'", other)),
    };

    match words.as_slice() {
        ["press", args @ ..] => position(args).map(|(r, c)| ConsoleCommand::Press(r, c)),
        ["release", args @ ..] => position(args).map(|(r, c)| ConsoleCommand::Release(r, c)),
        ["tap", args @ ..] => position(args).map(|(r, c)| ConsoleCommand::Tap(r, c)),
        ["turn", "cw"] => Ok(ConsoleCommand::Turn { clockwise: true }),
        ["turn", "ccw"] => Ok(ConsoleCommand::Turn { clockwise: false }),
        ["knob", state] => updown(*state).map(|pressed| ConsoleCommand::Knob { pressed }),
        ["cfg", button, state] => Ok(ConsoleCommand::ConfigButton {
            button: button
                .parse()
                .map_err(|_| format!("bad button '{}'", button))?,
            pressed: updown(*state)?,
        }),
        ["clear"] => Ok(ConsoleCommand::ReleaseAll),
        _ => Err(format!("unknown command '{}'", line.trim())),
    }
}

pub fn apply(keypad: &SimulatedKeypad, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Press(r, c) => keypad.press(r, c),
        ConsoleCommand::Release(r, c) => keypad.release(r, c),
        ConsoleCommand::Tap(r, c) => {
            keypad.press(r, c);
            std::thread::sleep(TAP_HOLD);
            keypad.release(r, c);
        }
        ConsoleCommand::Turn { clockwise } => keypad.turn(clockwise),
        ConsoleCommand::Knob { pressed } => keypad.set_encoder_button(pressed),
        ConsoleCommand::ConfigButton { button, pressed } => {
            keypad.set_config_button(button, pressed)
        }
        ConsoleCommand::ReleaseAll => keypad.release_all(),
    }
}

/// Read commands from stdin on a background thread until EOF
pub fn spawn(keypad: SimulatedKeypad) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            info!("Console ready: press|release|tap <row> <col>, turn cw|ccw, knob down|up, cfg <n> down|up, clear");
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => apply(&keypad, command),
                    Err(e) => warn!("{}", e),
                }
            }
        })
}
