//! `pulsecrm`: run the CRM daemon and its maintenance commands.

mod seed;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pulsecrm_kernel::{spawn_scheduler, CrmKernel, JOB_NAMES};
use pulsecrm_types::config::{resolve_env, CrmConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const REDACTED: &str = "<redacted>";

/// PulseCRM: AI-assisted CRM automation daemon.
#[derive(Parser, Debug)]
#[command(name = "pulsecrm", version, about)]
struct Cli {
    /// Config file (defaults to ~/.pulsecrm/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the API server and background jobs.
    Start {
        /// Override `api_listen`.
        #[arg(long)]
        listen: Option<String>,
    },
    /// Create or upgrade the database schema.
    InitDb,
    /// Insert sample leads, a customer, a cart and an invoice.
    Seed,
    /// Run one background job now and print its report.
    RunJob {
        /// One of: follow_up, nurturing, cart_recovery, payment_reminder,
        /// alerts, dedup, dispatch.
        name: String,
    },
    /// Print the effective configuration.
    Config,
}

fn init_logging(config: &CrmConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_format == "pretty" {
        builder.pretty().init();
    } else {
        builder.json().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CrmConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Config => {
            println!("{}", redacted_config(&config)?);
            Ok(())
        }
        Command::InitDb => {
            init_logging(&config);
            let kernel = CrmKernel::boot_with_config(config)?;
            kernel.store.migrate()?;
            println!("Database ready at {}", kernel.config.db_path().display());
            Ok(())
        }
        Command::Seed => {
            init_logging(&config);
            let kernel = CrmKernel::boot_with_config(config)?;
            let created = seed::seed(&kernel)?;
            println!("{}", serde_json::to_string_pretty(&created)?);
            Ok(())
        }
        Command::RunJob { name } => {
            if !JOB_NAMES.contains(&name.as_str()) {
                bail!("unknown job '{name}', expected one of: {}", JOB_NAMES.join(", "));
            }
            init_logging(&config);
            let kernel = CrmKernel::boot_with_config(config)?;
            let report = kernel.run_job(&name).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Start { listen } => {
            init_logging(&config);
            start(config, listen).await
        }
    }
}

async fn start(config: CrmConfig, listen: Option<String>) -> Result<()> {
    let listen = listen.unwrap_or_else(|| config.api_listen.clone());
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address '{listen}'"))?;

    let kernel = Arc::new(CrmKernel::boot_with_config(config)?);
    kernel.store.migrate()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let jobs = spawn_scheduler(Arc::clone(&kernel), shutdown_rx);

    pulsecrm_api::run_server(kernel, addr, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
    })
    .await?;

    let _ = shutdown_tx.send(true);
    for job in jobs {
        let _ = job.await;
    }
    info!("PulseCRM stopped");
    Ok(())
}

/// Render the config as TOML. Secrets never live in the file itself, only
/// the names of the variables holding them; those are annotated with
/// whether they are set. The n8n URL can embed a token and is masked.
fn redacted_config(config: &CrmConfig) -> Result<String> {
    let mut config = config.clone();
    if config.n8n.webhook_url.is_some() {
        config.n8n.webhook_url = Some(REDACTED.to_string());
    }
    let mut out = toml::to_string_pretty(&config)?;

    let mut vars = vec![
        config.default_model.api_key_env.clone(),
        config.meta.access_token_env.clone(),
        config.meta.app_secret_env.clone(),
        config.meta.verify_token_env.clone(),
        config.enrichment.clearbit_api_key_env.clone(),
    ];
    vars.extend(config.fallback_models.iter().map(|m| m.api_key_env.clone()));
    if let Some(wa) = &config.channels.whatsapp {
        vars.push(wa.access_token_env.clone());
    }
    if let Some(email) = &config.channels.email {
        vars.push(email.password_env.clone());
    }
    vars.retain(|v| !v.is_empty());
    vars.sort();
    vars.dedup();

    out.push_str("\n# Secret environment variables\n");
    for var in vars {
        let state = if resolve_env(&var).is_some() { "set" } else { "unset" };
        out.push_str(&format!("# {var}: {state}\n"));
    }
    Ok(out)
}
