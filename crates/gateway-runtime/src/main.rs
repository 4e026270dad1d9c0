//! # Contact Gateway Runtime
//!
//! Entry point for the contact-form gateway.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (TOML file named by `CONTACT_GATEWAY_CONFIG`, else defaults)
//! 2. Apply environment overrides and re-validate
//! 3. Initialize logging (`RUST_LOG` wins over `log.level`), then report
//!    any override that was ignored
//! 4. Build the service and serve until Ctrl+C

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use contact_gateway::{ContactGatewayService, GatewayConfig};

const CONFIG_ENV: &str = "CONTACT_GATEWAY_CONFIG";
const PORT_ENV: &str = "CONTACT_GATEWAY_PORT";
const DATA_DIR_ENV: &str = "CONTACT_GATEWAY_DATA_DIR";
const NOTIFY_ENV: &str = "CONTACT_GATEWAY_NOTIFY";

/// An environment override that could not be applied
#[derive(Debug, PartialEq, Eq)]
struct IgnoredOverride {
    key: &'static str,
    value: String,
}

/// Load configuration from file and environment. Ignored overrides are
/// returned so they can be reported once logging is up.
fn load_config() -> Result<(GatewayConfig, Vec<IgnoredOverride>)> {
    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => GatewayConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => GatewayConfig::default(),
    };

    let (config, ignored) = apply_overrides(config, |key| std::env::var(key).ok());
    config.validate().context("invalid configuration")?;
    Ok((config, ignored))
}

/// Apply `CONTACT_GATEWAY_*` overrides. Unparseable values are skipped.
fn apply_overrides<F>(mut config: GatewayConfig, lookup: F) -> (GatewayConfig, Vec<IgnoredOverride>)
where
    F: Fn(&str) -> Option<String>,
{
    let mut ignored = Vec::new();

    if let Some(port) = lookup(PORT_ENV) {
        match port.parse() {
            Ok(p) => config.http.port = p,
            Err(_) => ignored.push(IgnoredOverride {
                key: PORT_ENV,
                value: port,
            }),
        }
    }
    if let Some(dir) = lookup(DATA_DIR_ENV) {
        config.storage.data_dir = dir.into();
    }
    if let Some(address) = lookup(NOTIFY_ENV) {
        config.mail.notify_address = address;
    }

    (config, ignored)
}

fn init_logging(config: &GatewayConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .context("invalid log filter")?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if config.log.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, ignored) = load_config()?;
    init_logging(&config)?;

    for skipped in &ignored {
        warn!(value = %skipped.value, "{} is not valid, override ignored", skipped.key);
    }

    info!(
        version = contact_gateway::VERSION,
        addr = %config.http_addr(),
        "Starting Contact Gateway"
    );

    let service = ContactGatewayService::new(config).context("building gateway service")?;
    service.start().await?;

    Ok(())
}
