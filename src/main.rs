// ABOUTME: Entry point for the convoy CLI application.
// ABOUTME: Wires local providers into the orchestrator and dispatches subcommands.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use convoy::config::{self, Config};
use convoy::deploy::{
    Approval, DeployRequest, FileApprovals, HEARTBEAT_INTERVAL, InstanceLock, Orchestrator,
    TriggerEvent,
};
use convoy::error::{Error, Result};
use convoy::health::HttpProbe;
use convoy::history::{DeploymentRecord, DeploymentState, JsonlHistory};
use convoy::output::Output;
use convoy::provision::FileProvisioner;
use convoy::registry::StaticRegistry;
use convoy::secrets::EnvSecretStore;
use convoy::types::{BuildRequestId, CommitSha, Digest, EnvironmentName};
use std::env;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const APPROVAL_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // CONVOY_LOG wins over the verbose flag
    let filter = match env::var("CONVOY_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ if cli.verbose => EnvFilter::new("debug"),
        _ => EnvFilter::new("warn"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut output = Output::new(cli.output_mode());
    output.start_timer();

    if let Err(e) = run(cli, &output).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    let config_path = cli.config.clone();
    match cli.command {
        Commands::Init {
            service,
            image,
            force,
        } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, service.as_deref(), image.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Validate => {
            let config = load_config(config_path.as_deref())?;
            output.success(&format!(
                "{}: {} environment(s), {} trigger(s)",
                config.service,
                config.environments.len(),
                config.triggers.iter().count()
            ));
            Ok(())
        }
        Commands::Trigger {
            commit,
            branch_or_tag,
            build_request,
            approve_as,
            force,
        } => {
            let config = load_config(config_path.as_deref())?;
            let mut event = TriggerEvent::new(parse_commit(&commit)?, branch_or_tag);
            if let Some(id) = build_request {
                event = event.with_build_request(BuildRequestId::new(id));
            }

            let _lock = InstanceLock::acquire(&config.state_dir, &config.service, force)?
                .keep_alive(HEARTBEAT_INTERVAL);
            let orchestrator = build_orchestrator(config)?;
            if let Some(approver) = approve_as {
                for environment in orchestrator.config().environments.keys() {
                    orchestrator.approve(*environment, approver.clone(), None);
                }
            }

            output.progress(&format!("Triggered by {}", event.branch_or_tag));
            let result = interruptible(&orchestrator, orchestrator.handle_trigger(event)).await;
            orchestrator.shutdown().await;
            finish(output, result?)
        }
        Commands::Deploy {
            env,
            commit,
            tag,
            digest,
            supersede,
            approve_as,
            force,
        } => {
            let config = load_config(config_path.as_deref())?;
            let environment = parse_environment(&env)?;
            let commit = parse_commit(&commit)?;

            let mut image = config
                .image
                .with_tag(tag.as_deref().unwrap_or(commit.as_str()));
            if let Some(ref digest) = digest {
                image = image.with_digest(&parse_digest(digest)?);
            }
            let mut request = DeployRequest::new(environment, image, commit);
            request.supersede = supersede;

            let _lock = InstanceLock::acquire(&config.state_dir, &config.service, force)?
                .keep_alive(HEARTBEAT_INTERVAL);
            let orchestrator = build_orchestrator(config)?;
            if let Some(approver) = approve_as {
                orchestrator.approve(environment, approver, None);
            }

            output.progress(&format!("Deploying {} to {}", request.image, environment));
            let result = interruptible(&orchestrator, orchestrator.deploy(request)).await;
            orchestrator.shutdown().await;
            finish(output, vec![result?])
        }
        Commands::Promote {
            from,
            approve_as,
            force,
        } => {
            let config = load_config(config_path.as_deref())?;
            let from = parse_environment(&from)?;
            let next = config.next_environment(from);

            let _lock = InstanceLock::acquire(&config.state_dir, &config.service, force)?
                .keep_alive(HEARTBEAT_INTERVAL);
            let orchestrator = build_orchestrator(config)?;
            if let (Some(approver), Some(next)) = (approve_as, next) {
                orchestrator.approve(next, approver, None);
            }

            output.progress(&format!("Promoting from {}", from));
            let result = interruptible(&orchestrator, orchestrator.promote(from)).await;
            orchestrator.shutdown().await;
            finish(output, vec![result?])
        }
        Commands::Approve {
            env,
            approver,
            digest,
        } => {
            let config = load_config(config_path.as_deref())?;
            let environment = parse_environment(&env)?;
            if !config.environments.contains_key(&environment) {
                return Err(Error::UnknownEnvironment(environment.to_string()));
            }
            let digest = digest.as_deref().map(parse_digest).transpose()?;

            let approval = Approval::new(approver, digest);
            let path = FileApprovals::new(&config.state_dir).write(environment, &approval)?;
            tracing::debug!("approval written to {}", path.display());
            output.success(&format!(
                "Approved next {} deployment as {}",
                environment, approval.approver
            ));
            Ok(())
        }
        Commands::History { env, limit } => {
            let config = load_config(config_path.as_deref())?;
            let environment = parse_environment(&env)?;
            let history = JsonlHistory::new(config.state_dir.join("history"));

            let mut records = convoy::history::HistoryStore::records(&history, environment).await?;
            if let Some(limit) = limit {
                let skip = records.len().saturating_sub(limit);
                records.drain(..skip);
            }
            output.history(&records);
            Ok(())
        }
        Commands::Status => {
            let config = load_config(config_path.as_deref())?;
            let orchestrator = build_orchestrator(config)?;
            let statuses = orchestrator.status().await?;
            orchestrator.shutdown().await;
            output.status(&statuses);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover(&env::current_dir()?),
    }
}

/// Local providers: file-backed infrastructure and history under the state dir.
fn build_orchestrator(config: Config) -> Result<Orchestrator> {
    let provisioner = Arc::new(FileProvisioner::new(config.state_dir.join("infra")));
    let registry = StaticRegistry::for_repository(&config.image, &config.registry.tags);
    let probe = HttpProbe::from_descriptors(config.descriptors().values())
        .map_err(|e| Error::InvalidConfig(e.to_string()))?
        .with_fallback(provisioner.clone());
    let history = JsonlHistory::new(config.state_dir.join("history"));

    let orchestrator = Orchestrator::builder(config)
        .registry(Arc::new(registry))
        .provisioner(provisioner)
        .probe(Arc::new(probe))
        .secrets(Arc::new(EnvSecretStore))
        .history(Arc::new(history))
        .watch_approval_files(APPROVAL_POLL_INTERVAL)
        .build()?;
    Ok(orchestrator)
}

/// Run `work`, aborting in-flight deployments on Ctrl-C and waiting for them to settle.
async fn interruptible<T>(
    orchestrator: &Orchestrator,
    work: impl Future<Output = std::result::Result<T, convoy::deploy::DeployError>>,
) -> Result<T> {
    tokio::pin!(work);
    tokio::select! {
        result = &mut work => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, aborting in-flight deployments");
            for environment in EnvironmentName::ALL {
                orchestrator.abort(environment);
            }
            Ok(work.await?)
        }
    }
}

/// Print outcomes; any deployment that did not end Healthy is an error.
fn finish(output: &Output, records: Vec<DeploymentRecord>) -> Result<()> {
    for record in &records {
        output.record(record);
    }
    match records
        .iter()
        .find(|r| r.state != DeploymentState::Healthy)
    {
        Some(record) => Err(Error::DeploymentUnsuccessful {
            id: record.id.to_string(),
            state: record.state.to_string(),
        }),
        None => {
            output.success("Deployment healthy");
            Ok(())
        }
    }
}

fn parse_environment(value: &str) -> Result<EnvironmentName> {
    value
        .parse()
        .map_err(|_| Error::UnknownEnvironment(value.to_string()))
}

fn parse_commit(value: &str) -> Result<CommitSha> {
    CommitSha::new(value).map_err(|e| Error::InvalidConfig(format!("--commit: {}", e)))
}

fn parse_digest(value: &str) -> Result<Digest> {
    Digest::parse(value).map_err(|e| Error::InvalidConfig(format!("--digest: {}", e)))
}
