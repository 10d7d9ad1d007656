use std::path::Path;

use {
    anyhow::{Context, Result, bail},
    clap::Args,
    scalarweb_auth::{AuthClientFactory, Registrar, ScalarWebService},
    scalarweb_common::{CancellationToken, run_until_cancelled},
    scalarweb_config::{DeviceConfig, ScalarWebConfig},
    secrecy::Secret,
    serde_json::Value,
    tracing::{debug, warn},
};

/// Which device a command talks to: a configured name or a bare address.
#[derive(Args)]
pub struct DeviceTarget {
    /// Device name from the config file.
    #[arg(long, conflicts_with = "address", required_unless_present = "address")]
    device: Option<String>,
    /// Device base URL, e.g. http://192.168.1.20 (bypasses the config file).
    #[arg(long)]
    address: Option<String>,
    /// Access code for --address: RQST, a 4-digit PIN, or a pre-shared key.
    #[arg(long, requires = "address", env = "SCALARWEB_ACCESS_CODE")]
    access_code: Option<String>,
}

impl DeviceTarget {
    fn resolve(&self, config: &ScalarWebConfig) -> Result<DeviceConfig> {
        if let Some(name) = &self.device {
            return config
                .device(name)
                .cloned()
                .with_context(|| format!("no device named \"{name}\" in config"));
        }
        let address = self
            .address
            .clone()
            .context("either --device or --address is required")?;
        Ok(DeviceConfig {
            name: address.clone(),
            address,
            access_code: self.access_code.clone().map(Secret::new),
            ..Default::default()
        })
    }
}

#[derive(Args)]
pub struct CallArgs {
    #[command(flatten)]
    target: DeviceTarget,
    /// Service name, e.g. system, avContent, audio.
    #[arg(long)]
    service: String,
    /// Method name, e.g. getPowerStatus.
    #[arg(long)]
    method: String,
    #[arg(long, default_value = "1.0")]
    version: String,
    /// JSON params: an array is sent as is, anything else is wrapped in one.
    #[arg(long)]
    params: Option<String>,
}

fn factory(config: &ScalarWebConfig) -> Result<AuthClientFactory> {
    AuthClientFactory::new(&config.http, config.registration.clone())
        .context("failed to build HTTP client")
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, abandoning device call");
            token.cancel();
        }
    });
}

pub async fn register(target: DeviceTarget, config_dir: Option<&Path>) -> Result<i32> {
    let config = scalarweb_config::discover_and_load(config_dir);
    let device = target.resolve(&config)?;
    let registrar = factory(&config)?.registrar(&device)?;
    debug!(endpoint = %registrar.endpoint(), "registering with device");

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    match run_until_cancelled(&cancel, registrar.register()).await? {
        Ok(token) if token.is_empty() => {
            println!(
                "{} accepted the registration without issuing a session cookie.",
                registrar.host()
            );
            Ok(0)
        },
        Ok(token) => {
            match token.expires_at() {
                Some(at) => println!("Session granted by {}, expires {at}.", registrar.host()),
                None => println!("Session granted by {}, no expiry.", registrar.host()),
            }
            Ok(0)
        },
        Err(e) => {
            eprintln!("{e}");
            if e.is_connection_failure() {
                eprintln!("Check the address and that the device is powered on.");
            }
            Ok(1)
        },
    }
}

pub async fn call(args: CallArgs, config_dir: Option<&Path>) -> Result<i32> {
    let config = scalarweb_config::discover_and_load(config_dir);
    let device = args.target.resolve(&config)?;
    let service: ScalarWebService = args.service.parse()?;
    let params = parse_params(args.params.as_deref())?;

    let client = factory(&config)?.build(&device)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let body = run_until_cancelled(
        &cancel,
        client.call(service, &args.method, &args.version, params),
    )
    .await??;
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(if body.get("error").is_some_and(|e| !e.is_null()) {
        1
    } else {
        0
    })
}

fn parse_params(raw: Option<&str>) -> Result<Vec<Value>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Value>(raw).context("--params must be valid JSON")? {
        Value::Array(items) => Ok(items),
        Value::Null => bail!("--params must not be null"),
        other => Ok(vec![other]),
    }
}
