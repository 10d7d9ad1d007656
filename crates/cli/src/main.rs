mod config_commands;
mod device_commands;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "scalarweb", about = "scalarweb: control Scalar-Web devices", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides ./ and ~/.config/scalarweb/).
    #[arg(long, global = true, env = "SCALARWEB_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,

    /// Print collected metrics to stderr before exiting.
    #[cfg(feature = "prometheus")]
    #[arg(long, global = true, default_value_t = false)]
    print_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform the actRegister handshake and report the session it grants.
    Register {
        #[command(flatten)]
        target: device_commands::DeviceTarget,
    },
    /// Send a JSON-RPC call through the authenticated pipeline.
    Call(device_commands::CallArgs),
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[cfg(feature = "metrics")]
fn init_metrics(cli: &Cli) -> anyhow::Result<scalarweb_metrics::MetricsHandle> {
    let config = scalarweb_config::discover_and_load(cli.config_dir.as_deref());
    #[cfg(feature = "prometheus")]
    let enabled = config.metrics.enabled || cli.print_metrics;
    #[cfg(not(feature = "prometheus"))]
    let enabled = config.metrics.enabled;

    Ok(scalarweb_metrics::init_metrics(
        scalarweb_metrics::MetricsRecorderConfig {
            enabled,
            global_labels: vec![("version".into(), env!("CARGO_PKG_VERSION").into())],
        },
    )?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "scalarweb starting");

    #[cfg(feature = "metrics")]
    let metrics = init_metrics(&cli)?;

    let config_dir = cli.config_dir.as_deref();
    let code = match cli.command {
        Commands::Register { target } => device_commands::register(target, config_dir).await?,
        Commands::Call(args) => device_commands::call(args, config_dir).await?,
        Commands::Config { action } => config_commands::handle_config(action, config_dir)?,
    };

    #[cfg(feature = "prometheus")]
    if cli.print_metrics {
        eprint!("{}", metrics.render());
    }
    #[cfg(all(feature = "metrics", not(feature = "prometheus")))]
    let _ = metrics;

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
