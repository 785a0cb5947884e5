use clap::Parser;
use std::path::PathBuf;

/// Chat with an LLM that can call the tools of an MCP tool server.
///
/// Settings come from the environment (and `.env`); flags override them.
#[derive(Parser, Debug)]
#[command(name = "toolchat", version, about = "Tool-augmented LLM chat in the terminal")]
pub struct CliArgs {
    /// Tool server script to launch (.py or .js)
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// API key for the chat endpoint (overrides DEEPSEEK_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Endpoint base URL (overrides BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Model identifier (overrides MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Configuration profile: settings are read from {PROFILE}_{KEY} first
    #[arg(long, env = "TOOLCHAT_PROFILE", default_value = "")]
    pub profile: String,

    /// Print the tool server's tools and exit
    #[arg(long)]
    pub list_tools: bool,
}
