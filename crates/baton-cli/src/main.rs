use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one conversation with the built-in tools
    Run(RunArgs),

    /// Print the specs of the built-in tools as JSON
    Tools,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// The user message that starts the conversation
    prompt: String,

    /// Model to use instead of the configured one
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum number of completion calls
    #[arg(long)]
    max_turns: Option<usize>,

    /// Stream the assistant's replies as they are generated
    #[arg(long)]
    stream: bool,

    /// Show tool calls without executing them
    #[arg(long)]
    no_tools: bool,

    /// Initial context variable; values are parsed as JSON when possible
    #[arg(long = "context", value_name = "KEY=VALUE")]
    context: Vec<String>,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::Tools => commands::tools::execute(),
    }
}
