use std::io::IsTerminal;
use std::path::PathBuf;

use manifold::config::{Config, MANIFEST_FILE};
use manifold::controller::is_expected_shutdown_diagnostic;
use manifold::dashboard::Dashboard;
use manifold::theme::{resolve_color_enabled, styled, OutputMode, Theme};
use manifold::{parse_command, render_help, CliCommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("manifold: {err}");
            eprintln!("Run `manifold --help` for usage.");
            std::process::exit(2);
        }
    };

    match command {
        CliCommand::Help => print!("{}", render_help()),
        CliCommand::Version => println!("manifold {}", env!("CARGO_PKG_VERSION")),
        CliCommand::Run { config } => {
            init_logging();
            let path = config.unwrap_or_else(|| PathBuf::from(MANIFEST_FILE));
            let config = match Config::load(&path) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("manifold: {err}");
                    std::process::exit(1);
                }
            };
            let mut dashboard = Dashboard::from_config(&config);
            match dashboard.run() {
                Ok(diagnostics) => print_summary(&diagnostics),
                Err(err) => {
                    eprintln!("manifold: dashboard failed: {err}");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Log to a file, never to the terminal the dashboard owns.
fn init_logging() {
    let path = std::env::var("MANIFOLD_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".manifold/manifold.log"));
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    else {
        return;
    };
    let level = match std::env::var("MANIFOLD_LOG_LEVEL").ok().as_deref() {
        Some("debug") => Level::DEBUG,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn print_summary(diagnostics: &[(String, String)]) {
    let color_enabled =
        resolve_color_enabled(OutputMode::from_env(), std::io::stdout().is_terminal());
    let theme = Theme::default();
    println!("Process results");
    for (name, diagnostic) in diagnostics {
        let ok = diagnostic == "exit=0"
            || diagnostic == "never-started"
            || is_expected_shutdown_diagnostic(diagnostic);
        let status = if !color_enabled {
            diagnostic.clone()
        } else if ok {
            styled(theme.success, diagnostic)
        } else {
            styled(theme.error, diagnostic)
        };
        println!("  {name}: {status}");
    }
}
