use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use scalarweb_config::{Severity, ValidationResult, find_config_file, load_config, validate};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the path of the config file that would be loaded.
    Path,
}

/// Returns the process exit code.
pub fn handle_config(action: ConfigAction, config_dir: Option<&Path>) -> Result<i32> {
    match action {
        ConfigAction::Check { verbose } => check(config_dir, verbose),
        ConfigAction::Path => {
            match find_config_file(config_dir) {
                Some(path) => println!("{}", path.display()),
                None => eprintln!("No config file found."),
            }
            Ok(0)
        },
    }
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config_dir: Option<&Path>, verbose: bool) -> Result<i32> {
    let config = match find_config_file(config_dir) {
        Some(path) => {
            eprintln!("Checking {}\n", path.display());
            // A file that does not parse is itself the diagnostic.
            match load_config(&path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("  {BOLD}{RED}error{RESET} {e:#}");
                    return Ok(1);
                },
            }
        },
        None => {
            eprintln!("No config file found; checking defaults.\n");
            Default::default()
        },
    };

    let result = validate(&config);
    print_diagnostics(&result, verbose);
    Ok(if result.has_errors() {
        1
    } else {
        0
    })
}

fn print_diagnostics(result: &ValidationResult, verbose: bool) {
    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} [{}] {}", d.category, d.message);
        } else {
            eprintln!(
                "  {BOLD}{color}{label}{RESET} [{}] {}: {}",
                d.category, d.path, d.message
            );
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }
}
