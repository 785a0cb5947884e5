//! Parsing of REPL input lines.

/// What one line of user input asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Blank line.
    Nothing,
    Exit,
    /// `/tools`: list the tool server's tools.
    Tools,
    /// `/reset`: start a fresh transcript.
    Reset,
    /// `/key <credential>`: switch API keys.
    Key(String),
    /// A slash command that is not one of the above.
    Unknown(String),
    /// Anything else is a question for the model.
    Ask(String),
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    match line {
        "" => Command::Nothing,
        "exit" | "quit" | "/exit" | "/quit" => Command::Exit,
        "/tools" => Command::Tools,
        "/reset" => Command::Reset,
        _ => {
            if let Some(rest) = line.strip_prefix("/key") {
                if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                    return Command::Key(rest.trim().to_string());
                }
            }
            if line.starts_with('/') {
                Command::Unknown(line.to_string())
            } else {
                Command::Ask(line.to_string())
            }
        }
    }
}
