//! Terminal notifications.

use crate::session::Notifier;

/// Prints notifications as a highlighted line on stderr
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, title: &str, body: &str) {
        // Bell plus bold title
        eprintln!("\x07\x1b[1m{title}\x1b[0m: {body}");
    }
}
