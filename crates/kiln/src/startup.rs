use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use kiln_bootstrap::{
    BootstrapConfig, BootstrapServices, BridgeReadinessCheck, CommandProvisioningEngine,
    JsonlTelemetry, NoopTelemetry, Session, SessionBootstrapper, SessionPhase, TaskQueue,
    Telemetry, TracingTelemetry,
};
use kiln_cli::{Cli, CliTelemetrySink};
use kiln_core::LogRotationPolicy;
use kiln_provider::{
    BuiltinSchemaCatalog, CredentialField, CredentialResolver, FileCredentialStore,
    ProviderPolicy, ProviderSelection,
};

use crate::terminal_presenter::TerminalPresenter;

pub(crate) fn build_config(cli: &Cli) -> BootstrapConfig {
    BootstrapConfig::new(&cli.spell_dir, &cli.app_name)
}

pub(crate) fn build_session(cli: &Cli) -> Session {
    Session::new(ProviderSelection::from_cli(&cli.provider, cli.provider_kind))
        .with_names(cli.controller.clone(), cli.model.clone())
}

pub(crate) fn build_telemetry(cli: &Cli) -> Arc<dyn Telemetry> {
    match cli.telemetry {
        CliTelemetrySink::Off => Arc::new(NoopTelemetry),
        CliTelemetrySink::Log => Arc::new(TracingTelemetry),
        CliTelemetrySink::Jsonl => Arc::new(JsonlTelemetry::new(
            &cli.telemetry_log,
            LogRotationPolicy::from_env(),
        )),
    }
}

pub(crate) fn build_services(cli: &Cli) -> Result<BootstrapServices> {
    let engine = CommandProvisioningEngine::new(&cli.engine_bin)
        .context("invalid --engine-bin")?;
    let store = FileCredentialStore::new(
        &cli.credential_store,
        cli.credential_store_encryption.into(),
        cli.credential_store_key.clone(),
    );
    Ok(BootstrapServices {
        engine: Arc::new(engine),
        credentials: CredentialResolver::new(
            Arc::new(store),
            Arc::new(BuiltinSchemaCatalog::default()),
            ProviderPolicy::default(),
            &cli.app_name,
        ),
        readiness: Arc::new(BridgeReadinessCheck::new(&cli.bridge_interface)),
        presenter: Arc::new(TerminalPresenter),
        telemetry: build_telemetry(cli),
        tasks: TaskQueue::new(),
    })
}

pub(crate) fn submitted_credentials(cli: &Cli) -> Vec<CredentialField> {
    cli.credentials
        .iter()
        .map(|(key, value)| CredentialField::new(key, value))
        .collect()
}

/// Drives one session headlessly: credentials come from `--credential`.
pub(crate) async fn run_session(cli: &Cli, services: BootstrapServices) -> Result<Session> {
    let resolver = services.credentials.clone();
    let mut bootstrapper =
        SessionBootstrapper::new(build_config(cli), services, build_session(cli));

    let mut phase = bootstrapper.start().await;
    if phase == SessionPhase::CredentialPrompt {
        let selection = bootstrapper.session().provider().clone();
        if cli.credentials.is_empty() {
            let schema = resolver.schema(&selection)?;
            let fields = schema
                .fields
                .iter()
                .filter(|field| field.required)
                .map(|field| field.key.as_str())
                .collect::<Vec<_>>();
            bail!(
                "credentials required for '{}': pass --credential KEY=VALUE for {}",
                selection.name(),
                fields.join(", ")
            );
        }
        phase = bootstrapper
            .finish(Some(submitted_credentials(cli)), false)
            .await;
    } else if !cli.credentials.is_empty() {
        tracing::debug!(
            provider = %cli.provider,
            "--credential ignored; provider did not ask for credentials"
        );
    }

    match phase {
        SessionPhase::PrecheckWait => bail!(
            "pre-check failed for '{}'; resolve it and run again",
            cli.provider
        ),
        SessionPhase::Error => return Err(session_failure(bootstrapper.session())),
        _ => {}
    }

    match bootstrapper.wait_for_completion().await {
        SessionPhase::Done => Ok(bootstrapper.into_session()),
        SessionPhase::Error => Err(session_failure(bootstrapper.session())),
        other => bail!("session stopped in phase {other}"),
    }
}

fn session_failure(session: &Session) -> anyhow::Error {
    session
        .reported_errors()
        .iter()
        .find(|error| error.displayed)
        .map(|error| anyhow!("{}", error.message))
        .unwrap_or_else(|| anyhow!("bootstrap failed"))
}
