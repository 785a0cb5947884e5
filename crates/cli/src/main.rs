mod cli;
mod repl;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use toolchat_client::{BlockingClient, ClientOptions, ProviderFactory};
use toolchat_core::config::{load_dotenv, Config};
use toolchat_runtime::Transcript;

use crate::cli::CliArgs;
use crate::repl::Command;
use crate::terminal::Terminal;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    // .env first so clap's env fallbacks see it too.
    load_dotenv();
    let args = CliArgs::parse();
    let terminal = Terminal::new();

    let mut config = Config::from_env_profile(&args.profile);
    apply_overrides(&mut config, &args);
    config.validate().context("incomplete configuration")?;
    config.log_summary();

    let llm_config = config.llm.clone();
    let factory: ProviderFactory =
        Arc::new(move |api_key: &str| toolchat_llm::create_provider(&llm_config, api_key));

    let client = BlockingClient::new(ClientOptions::from_config(&config), factory)
        .context("failed to start client")?;
    client
        .connect(&config.tools.script_path)
        .with_context(|| format!("failed to connect to {}", config.tools.script_path.display()))?;

    if args.list_tools {
        let tools = client.list_tools().context("failed to list tools")?;
        terminal.print_tools(&tools)?;
        return Ok(());
    }

    terminal.print_banner(
        config.llm.model.as_deref().unwrap_or_default(),
        &config.tools.script_path.display().to_string(),
    )?;
    if config.llm.api_key.is_none() {
        terminal.print_info("No API key set. Use /key <api key> before asking.")?;
    }

    let mut transcript = Transcript::new();
    while let Some(line) = terminal.read_line()? {
        match repl::parse(&line) {
            Command::Nothing => {}
            Command::Exit => break,
            Command::Tools => match client.list_tools() {
                Ok(tools) => terminal.print_tools(&tools)?,
                Err(e) => terminal.print_error(&e.to_string())?,
            },
            Command::Reset => {
                transcript.clear();
                terminal.print_info("Conversation cleared.")?;
            }
            Command::Key(key) if key.is_empty() => {
                terminal.print_error("Usage: /key <api key>")?;
            }
            Command::Key(key) => match client.reconfigure(&key) {
                Ok(true) => terminal.print_info("API key updated; the tool server will reconnect.")?,
                Ok(false) => terminal.print_info("API key unchanged.")?,
                Err(e) => terminal.print_error(&e.to_string())?,
            },
            Command::Unknown(cmd) => {
                terminal.print_error(&format!("Unknown command: {}", cmd))?;
            }
            Command::Ask(question) => {
                transcript.add_user_message(question);
                match client.process(&mut transcript) {
                    Ok(answer) => terminal.print_answer(&answer)?,
                    Err(e) => {
                        error!(error = %e, "Question failed");
                        terminal.print_error(&e.to_string())?;
                    }
                }
            }
        }
    }

    info!(turns = transcript.len(), "Session ended");
    terminal.print_info("Goodbye.")?;
    client.cleanup().context("failed to stop the tool server")?;
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &CliArgs) {
    if let Some(script) = &args.script {
        config.tools.script_path = script.clone();
    }
    if let Some(key) = &args.api_key {
        config.llm.api_key = Some(key.clone());
    }
    if let Some(url) = &args.base_url {
        config.llm.base_url = Some(url.clone());
    }
    if let Some(model) = &args.model {
        config.llm.model = Some(model.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_flags_override_environment() {
        let mut config = Config::from_lookup("", |key| match key {
            "BASE_URL" => Some("https://api.deepseek.com".to_string()),
            "MODEL" => Some("deepseek-chat".to_string()),
            _ => None,
        });
        let args = CliArgs::parse_from(["toolchat", "--model", "deepseek-reasoner", "--script", "quotes.js"]);

        apply_overrides(&mut config, &args);
        assert_eq!(config.llm.model.as_deref(), Some("deepseek-reasoner"));
        assert_eq!(config.llm.base_url.as_deref(), Some("https://api.deepseek.com"));
        assert_eq!(config.tools.script_path, PathBuf::from("quotes.js"));
        assert!(config.validate().is_ok());
    }
}
