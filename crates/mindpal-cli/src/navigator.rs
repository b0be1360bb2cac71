use std::io::{self, BufRead, Write};

use mindpal_core::Navigator;

/// Navigator for a terminal host.
///
/// Notices go to stderr and, when interactive, wait for Enter. Navigation
/// targets are printed to stdout as `redirect: <location>` so a wrapper
/// script can follow them.
pub struct TerminalNavigator {
    interactive: bool,
}

impl TerminalNavigator {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

impl Navigator for TerminalNavigator {
    fn show_notice(&self, message: &str) {
        eprintln!("{}", message);
        if self.interactive {
            eprint!("Press Enter to continue...");
            let _ = io::stderr().flush();
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
        }
    }

    fn navigate_to(&self, location: &str) {
        println!("redirect: {}", location);
    }
}
