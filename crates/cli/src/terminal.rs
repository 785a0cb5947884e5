use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};

use toolchat_runtime::ToolDefinition;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const ASSISTANT_TEXT: Color = Color::Cyan;
    const TOOL_NAME: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Longest tool description shown in a listing.
const DESCRIPTION_WIDTH: usize = 72;

/// Terminal I/O for the interactive REPL.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the startup banner.
    pub fn print_banner(&self, model: &str, server: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("toolchat"),
            ResetColor,
            Print(" - tool-augmented chat\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Model: {} | Tool server: {}\n", model, server)),
            Print("Commands: /tools, /reset, /key <api key>, exit\n"),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Read a line of user input with prompt. Returns `None` at end of input.
    pub fn read_line(&self) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::USER_PROMPT),
            Print("you> "),
            ResetColor,
        )?;
        stdout.flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(Some(input))
    }

    /// Print the model's answer.
    pub fn print_answer(&self, text: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ASSISTANT_TEXT),
            Print(format!("{}\n", text)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print a tool catalogue.
    pub fn print_tools(&self, tools: &[ToolDefinition]) -> Result<()> {
        let mut stdout = io::stdout();
        if tools.is_empty() {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print("The tool server offers no tools.\n"),
                ResetColor,
            )?;
            return Ok(());
        }

        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print(format!("Available tools ({}):\n", tools.len())),
            ResetColor,
        )?;
        for tool in tools {
            execute!(
                stdout,
                SetForegroundColor(Colors::TOOL_NAME),
                Print(format!("  {}", tool.name)),
                SetForegroundColor(Colors::DIM),
                Print(format!("  {}\n", summarize(&tool.description))),
                ResetColor,
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

/// First line of a description, cut to fit one terminal row.
fn summarize(description: &str) -> String {
    let first = description.lines().next().unwrap_or_default().trim();
    if first.chars().count() > DESCRIPTION_WIDTH {
        let cut: String = first.chars().take(DESCRIPTION_WIDTH - 3).collect();
        format!("{}...", cut)
    } else {
        first.to_string()
    }
}
