pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "saralytics",
    about = "Saralytics operator CLI",
    long_about = "Inspect configuration, check readiness, load the demo sales dataset, and ask the agents questions from the terminal.",
    after_help = "Examples:\n  saralytics doctor --json\n  saralytics seed\n  saralytics ask \"What is the total profit for MRF ZVTV?\"\n  saralytics ask --agent inventory \"Which sizes move fastest?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, data store readiness, and model credentials")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Create the sales schema and load the deterministic demo dataset")]
    Seed,
    #[command(about = "Ask a question and stream the answer to stdout")]
    Ask {
        #[arg(long, help = "Address a specialist directly (sales, inventory, finance)")]
        agent: Option<String>,
        #[arg(required = true, help = "Question text")]
        question: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Seed => commands::seed::run(),
        Command::Ask { agent, question } => {
            commands::ask::run(&question.join(" "), agent.as_deref(), &mut std::io::stdout())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
