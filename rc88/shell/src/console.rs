//! Console-backed display for the CLI runner.

use rc88_core::io::{Annunciator, DisplayPort};
use tracing::info;

/// Mirrors the LCD contract onto stdout/stderr: the digit line prints,
/// status and annunciator traffic goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDisplay;

impl DisplayPort for ConsoleDisplay {
    fn set_status(&mut self, text: &str) {
        eprintln!("[rc88] {text}");
    }

    fn set_digits(&mut self, text: &str) {
        println!("{text}");
    }

    fn set_annunciator(&mut self, which: Annunciator, on: bool) {
        info!(?which, on, "annunciator");
    }
}
