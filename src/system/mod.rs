//! Host integration: clocks and process-level power control

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::process::Command;
use tracing::{error, info};

use crate::power::{PowerControl, WakeSource};

/// Power control for a desktop host. Sleeping exits the process; timer wakes
/// and restarts re-execute the current binary with the same arguments.
pub struct HostPower {
    external_power: bool,
}

impl HostPower {
    pub fn new(external_power: bool) -> Self {
        Self { external_power }
    }

    fn reexec(&self) -> ! {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                error!("Cannot locate own executable for restart: {}", e);
                std::process::exit(1);
            }
        };
        let mut command = Command::new(&exe);
        command.args(std::env::args_os().skip(1));
        info!("Restarting {}", exe.display());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            let e = command.exec();
            error!("Restart failed: {}", e);
            std::process::exit(1);
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = command.spawn() {
                error!("Restart failed: {}", e);
                std::process::exit(1);
            }
            std::process::exit(0);
        }
    }
}

impl PowerControl for HostPower {
    fn deep_sleep(&self, wake: WakeSource) {
        match wake {
            WakeSource::Matrix { mask } => {
                info!("Sleeping until a key in mask {:#x} is pressed; exiting", mask);
                std::process::exit(0);
            }
            WakeSource::Timer(after) => {
                std::thread::sleep(after);
                self.reexec();
            }
        }
    }

    fn restart(&self) {
        self.reexec();
    }

    fn is_externally_powered(&self) -> bool {
        self.external_power
    }
}
