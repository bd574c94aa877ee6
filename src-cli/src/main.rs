use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use cq_core::config::RagConfig;
use cq_core::error::AppError;
use tracing_subscriber::EnvFilter;

mod commands;

const USAGE: &str = "Usage: citizenquery [--config <file>] <command> [args...]

Commands:
  ingest <text-file>            clean the text, extract articles and write chunks
  build                         embed chunks and write the index snapshot
  ask [-k N] [--debug] <q>...   answer one question
  chat [-k N]                   interactive questions (type `examples` or `quit`)
  eval [-k N] [--out <file>]    run the built-in evaluation suite
  status                        show index and model service status";

pub enum Command {
    Ingest { text_path: PathBuf },
    Build,
    Ask { question: String, k: Option<u32>, debug: bool },
    Chat { k: Option<u32> },
    Eval { k: Option<u32>, out: Option<PathBuf> },
    Status,
}

struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_k(value: Option<String>) -> anyhow::Result<u32> {
    let raw = value.context("-k needs a number")?;
    raw.parse::<u32>()
        .with_context(|| format!("-k expects a non-negative integer, got `{raw}`"))
}

fn parse_args(args: Vec<String>) -> anyhow::Result<Cli> {
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut k = None;
    let mut debug = false;
    let mut out = None;
    let mut command: Option<String> = None;
    let mut rest: Vec<String> = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "-k" | "--top-k" => k = Some(parse_k(args.next())?),
            "--debug" => debug = true,
            "--out" => out = Some(PathBuf::from(args.next().context("--out needs a path")?)),
            "-h" | "--help" => bail!("{USAGE}"),
            _ if command.is_none() => command = Some(arg),
            _ => rest.push(arg),
        }
    }

    let command = match command.as_deref() {
        Some("ingest") => {
            let path = rest.first().context("ingest needs the path of a text file")?;
            Command::Ingest {
                text_path: PathBuf::from(path),
            }
        }
        Some("build") => Command::Build,
        Some("ask") => {
            let question = rest.join(" ");
            if question.trim().is_empty() {
                bail!("ask needs a question\n\n{USAGE}");
            }
            Command::Ask { question, k, debug }
        }
        Some("chat") => Command::Chat { k },
        Some("eval") => Command::Eval { k, out },
        Some("status") => Command::Status,
        Some(other) => bail!("Unknown command: {other}\n\n{USAGE}"),
        None => bail!("{USAGE}"),
    };
    Ok(Cli {
        config_path,
        command,
    })
}

fn init_tracing() {
    // Logs go to stderr so answers on stdout stay clean.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn report_app_error(e: &AppError) {
    if let Some(details) = e.details.as_deref() {
        tracing::debug!(code = %e.code, details, "error details");
    }
    eprintln!("Error: {}", e.message);
    eprintln!("Hint: {}", e.hint());
}

fn run() -> anyhow::Result<()> {
    let cli = parse_args(env::args().skip(1).collect())?;
    let config = match cli.config_path.as_deref() {
        Some(path) => RagConfig::load_from(path)?,
        None => RagConfig::load()?,
    };
    commands::dispatch(&config, cli.command)
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<AppError>() {
                Some(app) => report_app_error(app),
                None => eprintln!("{err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &[&str]) -> Vec<String> {
        s.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn ask_joins_words_and_reads_flags_anywhere() {
        let cli = parse_args(args(&["ask", "-k", "5", "What", "is", "Article", "21?", "--debug"]))
            .expect("parse");
        match cli.command {
            Command::Ask { question, k, debug } => {
                assert_eq!(question, "What is Article 21?");
                assert_eq!(k, Some(5));
                assert!(debug);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn config_flag_and_bad_input_are_handled() {
        let cli = parse_args(args(&["--config", "alt.toml", "status"])).expect("parse");
        assert_eq!(cli.config_path, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Command::Status));

        assert!(parse_args(args(&["ask"])).is_err());
        assert!(parse_args(args(&["ingest"])).is_err());
        assert!(parse_args(args(&["frobnicate"])).is_err());
        assert!(parse_args(args(&["ask", "-k", "many", "q"])).is_err());
        assert!(parse_args(args(&[])).is_err());
    }
}
