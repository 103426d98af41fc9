use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use kiln_bootstrap::{
    testing::{
        PresenterEvent, RecordingPresenter, RecordingTelemetry, ScriptedEngine, StaticReadiness,
        TelemetryRecord,
    },
    BootstrapConfig, BootstrapServices, HookFailure, Session, SessionBootstrapper, SessionPhase,
    TaskQueue, POST_BOOTSTRAP_HOOK_RELATIVE_PATH,
};
use kiln_provider::{
    BuiltinSchemaCatalog, CredentialField, CredentialResolver, CredentialSet, CredentialStore,
    CredentialStoreEncryptionMode, FileCredentialStore, ProviderPolicy, ProviderSelection,
};

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

struct IsolatedWorkspace {
    root: PathBuf,
}

impl IsolatedWorkspace {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "kiln-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(root.join("spell")).expect("must create isolated spell dir");
        Self { root }
    }

    fn spell_dir(&self) -> PathBuf {
        self.root.join("spell")
    }

    fn store_path(&self) -> PathBuf {
        self.root.join("state").join("credentials.json")
    }

    fn store(&self) -> FileCredentialStore {
        FileCredentialStore::new(
            self.store_path(),
            CredentialStoreEncryptionMode::Keyed,
            Some("integration-passphrase".to_string()),
        )
    }

    #[cfg(unix)]
    fn install_hook(&self, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = self.spell_dir().join(POST_BOOTSTRAP_HOOK_RELATIVE_PATH);
        fs::create_dir_all(path.parent().expect("hook parent")).expect("must create steps dir");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("must write hook");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("must chmod hook");
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

struct Run {
    bootstrapper: SessionBootstrapper,
    engine: Arc<ScriptedEngine>,
    presenter: Arc<RecordingPresenter>,
    telemetry: Arc<RecordingTelemetry>,
}

fn run(workspace: &IsolatedWorkspace, selection: ProviderSelection, engine: ScriptedEngine) -> Run {
    let engine = Arc::new(engine);
    let presenter = Arc::new(RecordingPresenter::default());
    let telemetry = Arc::new(RecordingTelemetry::default());
    let services = BootstrapServices {
        engine: engine.clone(),
        credentials: CredentialResolver::new(
            Arc::new(workspace.store()),
            Arc::new(BuiltinSchemaCatalog::default()),
            ProviderPolicy::default(),
            "kiln",
        ),
        readiness: Arc::new(StaticReadiness::ready()),
        presenter: presenter.clone(),
        telemetry: telemetry.clone(),
        tasks: TaskQueue::new(),
    };
    Run {
        bootstrapper: SessionBootstrapper::new(
            BootstrapConfig::new(workspace.spell_dir(), "kiln"),
            services,
            Session::new(selection),
        ),
        engine,
        presenter,
        telemetry,
    }
}

fn aws_fields() -> Vec<CredentialField> {
    vec![
        CredentialField::new("access-key", "AKIAINTEGRATION"),
        CredentialField::new("secret-key", "integration-secret"),
    ]
}

fn store_contains(path: &Path, needle: &str) -> bool {
    fs::read_to_string(path)
        .map(|raw| raw.contains(needle))
        .unwrap_or(false)
}

#[tokio::test]
async fn integration_aws_without_cache_prompts_persists_and_completes() {
    let workspace = IsolatedWorkspace::new("aws-e2e");
    let mut run = run(
        &workspace,
        ProviderSelection::inferred("aws"),
        ScriptedEngine::new().with_cloud("aws", "ec2"),
    );

    assert_eq!(
        run.bootstrapper.start().await,
        SessionPhase::CredentialPrompt
    );
    assert!(run.presenter.events().iter().any(|event| matches!(
        event,
        PresenterEvent::CredentialPrompt { provider, .. } if provider == "aws"
    )));

    run.bootstrapper.finish(Some(aws_fields()), false).await;
    let persisted = workspace
        .store()
        .load("aws")
        .expect("store readable")
        .expect("aws credentials persisted");
    assert_eq!(persisted.id, "kiln-aws");
    assert!(!store_contains(&workspace.store_path(), "integration-secret"));

    assert_eq!(
        run.bootstrapper.wait_for_completion().await,
        SessionPhase::Done
    );
    let requests = run.engine.bootstrap_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].credential.as_deref(), Some("kiln-aws"));
    assert_eq!(run.presenter.last_status().as_deref(), Some(""));
    assert!(run.presenter.errors().is_empty());
}

#[tokio::test]
async fn integration_maas_with_cached_credentials_still_prompts() {
    let workspace = IsolatedWorkspace::new("maas-e2e");
    workspace
        .store()
        .save(
            "maas",
            &CredentialSet {
                id: "kiln-maas".to_string(),
                auth_type: "oauth1".to_string(),
                fields: vec![
                    CredentialField::new("maas-server", "10.10.0.1"),
                    CredentialField::new("maas-oauth", "stale"),
                ],
            },
        )
        .expect("seed cache");
    let mut run = run(
        &workspace,
        ProviderSelection::inferred("maas"),
        ScriptedEngine::new(),
    );

    assert_eq!(
        run.bootstrapper.start().await,
        SessionPhase::CredentialPrompt
    );

    run.bootstrapper
        .finish(
            Some(vec![
                CredentialField::new("maas-server", "10.20.0.1"),
                CredentialField::new("maas-oauth", "fresh"),
            ]),
            false,
        )
        .await;
    assert_eq!(
        run.bootstrapper.wait_for_completion().await,
        SessionPhase::Done
    );
    assert_eq!(run.engine.bootstrap_requests()[0].cloud, "maas/10.20.0.1");
    let refreshed = workspace
        .store()
        .load("maas")
        .expect("store readable")
        .expect("maas credentials");
    assert_eq!(refreshed.field("maas-oauth"), Some("fresh"));
}

#[cfg(unix)]
#[tokio::test]
async fn integration_hook_return_code_failure_keeps_bootstrap() {
    let workspace = IsolatedWorkspace::new("hook-failure");
    workspace.install_hook(r#"echo '{"returnCode": 2, "message": "juju-deployer missing"}'"#);
    let mut run = run(
        &workspace,
        ProviderSelection::inferred("localhost"),
        ScriptedEngine::new().with_cloud("localhost", "lxd"),
    );

    run.bootstrapper.start().await;
    assert_eq!(
        run.bootstrapper.wait_for_completion().await,
        SessionPhase::Error
    );

    assert_eq!(run.engine.bootstrap_requests().len(), 1);
    let errors = run.presenter.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("post bootstrap processing phase"));
    assert!(errors[0].contains("juju-deployer missing"));
    let records = run.telemetry.records();
    assert!(records.contains(&TelemetryRecord::event("Bootstrap", "Done")));
    assert!(records.contains(&TelemetryRecord::Exception(
        "Error in Post-Bootstrap".to_string()
    )));
    assert_eq!(
        run.bootstrapper.session().reported_errors()[0].kind,
        "hook_failed"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn integration_hook_success_receives_session_environment() {
    let workspace = IsolatedWorkspace::new("hook-env");
    workspace.install_hook(
        r#"printf '{"returnCode":0,"payload":{"controller":"%s","model":"%s","provider":"%s"}}\n' "$CONTROLLER" "$MODEL" "$PROVIDERTYPE""#,
    );
    let mut run = run(
        &workspace,
        ProviderSelection::inferred("localhost"),
        ScriptedEngine::new()
            .with_cloud("localhost", "lxd")
            .with_provider_type(Some("lxd")),
    );

    run.bootstrapper.start().await;
    assert_eq!(
        run.bootstrapper.wait_for_completion().await,
        SessionPhase::Done
    );

    let session = run.bootstrapper.session();
    assert_eq!(
        session.hook_env().get("CONTROLLER").map(String::as_str),
        session.controller()
    );
    assert_eq!(
        session.hook_env().get("PROVIDERTYPE").map(String::as_str),
        Some("lxd")
    );
    assert_eq!(run.presenter.last_status().as_deref(), Some(""));
    assert!(run
        .telemetry
        .records()
        .contains(&TelemetryRecord::event("Post-Bootstrap", "Done")));
}

#[cfg(unix)]
#[tokio::test]
async fn integration_unparsable_hook_output_is_decode_failure() {
    let workspace = IsolatedWorkspace::new("hook-garbage");
    workspace.install_hook("echo 'deploying...'");
    let mut run = run(
        &workspace,
        ProviderSelection::inferred("localhost"),
        ScriptedEngine::new().with_cloud("localhost", "lxd"),
    );

    run.bootstrapper.start().await;
    assert_eq!(
        run.bootstrapper.wait_for_completion().await,
        SessionPhase::Error
    );
    let errors = run.presenter.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("not a valid result record"));
    assert!(errors[0].contains("deploying..."));

    let decode = serde_json::from_str::<serde_json::Value>("deploying...").expect_err("garbage");
    let failure = HookFailure::Decode {
        raw: "deploying...".to_string(),
        source: decode,
    };
    assert!(errors[0].ends_with(&failure.to_string()));
}

#[tokio::test]
async fn integration_new_session_displays_errors_again() {
    let workspace = IsolatedWorkspace::new("latch-reset");
    for code in [-15, 1] {
        let mut run = run(
            &workspace,
            ProviderSelection::inferred("localhost"),
            ScriptedEngine::new()
                .with_cloud("localhost", "lxd")
                .with_bootstrap_code(code),
        );
        run.bootstrapper.start().await;
        assert_eq!(
            run.bootstrapper.wait_for_completion().await,
            SessionPhase::Error
        );
        assert_eq!(run.presenter.errors().len(), 1);
    }
}
