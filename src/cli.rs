//! CLI argument parsing for the relay binary.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "mcp-relay", about = "Aggregating proxy for the Model Context Protocol")]
pub struct Args {
    /// Path to the YAML config document. Falls back to MCP_RELAY_CONFIG.
    #[arg(long, env = "MCP_RELAY_CONFIG")]
    pub config: String,

    /// Address to bind the HTTP surface on.
    #[arg(long, env = "MCP_RELAY_BIND", default_value = "0.0.0.0:8088")]
    pub bind: String,
}
