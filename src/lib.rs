pub mod config;
pub mod controller;
pub mod dashboard;
pub mod ingest;
pub mod input;
pub mod proctree;
pub mod pty;
pub mod term;
pub mod theme;

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Run { config: Option<PathBuf> },
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliParseError {
    MissingConfigValue,
    UnknownArgument(String),
}

impl std::fmt::Display for CliParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliParseError::MissingConfigValue => write!(f, "--config requires a value"),
            CliParseError::UnknownArgument(arg) => write!(f, "unknown argument: {arg}"),
        }
    }
}

impl std::error::Error for CliParseError {}

pub fn parse_command<I>(args: I) -> Result<CliCommand, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliCommand::Help),
            "--version" | "-V" => return Ok(CliCommand::Version),
            "--config" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingConfigValue);
                };
                config = Some(PathBuf::from(path));
            }
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }

    Ok(CliCommand::Run { config })
}

pub fn render_help() -> String {
    let mut help = String::new();
    help.push_str("manifold - terminal multiplexer for development workflows\n\n");
    help.push_str("Usage:\n");
    help.push_str("  manifold [--config <PATH>]\n\n");
    help.push_str("Options:\n");
    help.push_str("  --config <PATH>  Manifest to load (default: manifold.toml)\n");
    help.push_str("  -h, --help       Print this help\n");
    help.push_str("  -V, --version    Print the version\n\n");
    help.push_str("Keys:\n");
    help.push_str("  left/right, tab  Switch tab\n");
    help.push_str("  s / r / t        Stop / restart / toggle the focused process\n");
    help.push_str("  i                Interact with the focused process (ctrl-x detaches)\n");
    help.push_str("  pgup/pgdn        Scroll the pane\n");
    help.push_str("  q, ctrl-c        Quit\n");
    help
}
