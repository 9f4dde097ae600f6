//! Input line parsing.

/// One line typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Direct(String),
    Unread,
    Help,
    Quit,
    Say(String),
    /// Blank line
    Empty,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Say(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match (name, arg) {
            ("join", room) if !room.is_empty() => Self::Join(room.to_string()),
            ("dm", user) if !user.is_empty() => Self::Direct(user.to_string()),
            ("unread", "") => Self::Unread,
            ("help", "") => Self::Help,
            ("quit" | "exit", "") => Self::Quit,
            _ => Self::Invalid(line.to_string()),
        }
    }
}

pub const HELP: &str = "\
/join <room>  switch to a room
/dm <user>    switch to a direct conversation
/unread       list unread counts
/quit         leave
anything else is sent to the current conversation";
