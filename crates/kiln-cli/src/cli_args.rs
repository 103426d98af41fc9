use std::path::PathBuf;

use clap::Parser;

use crate::{
    parse_credential_pair, parse_resource_name, CliCredentialStoreEncryptionMode, CliProviderKind,
    CliTelemetrySink,
};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kiln",
    about = "Bootstrap a controller and initial model on the selected provider, then run the spell's post-bootstrap hook",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "KILN_PROVIDER",
        help = "Provider (cloud) name to bootstrap against, e.g. aws, localhost, maas, jaas"
    )]
    pub provider: String,

    #[arg(
        long = "provider-kind",
        env = "KILN_PROVIDER_KIND",
        value_enum,
        default_value_t = CliProviderKind::Auto,
        help = "Provider kind override; auto infers the kind from well-known provider names"
    )]
    pub provider_kind: CliProviderKind,

    #[arg(
        long = "spell-dir",
        env = "KILN_SPELL_DIR",
        help = "Spell directory holding steps/00_post-bootstrap and receiving bootstrap logs"
    )]
    pub spell_dir: PathBuf,

    #[arg(
        long = "app-name",
        env = "KILN_APP_NAME",
        default_value = "kiln",
        value_parser = parse_resource_name,
        help = "Prefix for generated controller and model names"
    )]
    pub app_name: String,

    #[arg(
        long,
        env = "KILN_CONTROLLER",
        value_parser = parse_resource_name,
        help = "Controller name; generated as <app>-<provider>-<suffix> when omitted"
    )]
    pub controller: Option<String>,

    #[arg(
        long,
        env = "KILN_MODEL",
        value_parser = parse_resource_name,
        help = "Model name; generated as <app>-<provider>-<suffix> when omitted"
    )]
    pub model: Option<String>,

    #[arg(
        long = "credential-store",
        env = "KILN_CREDENTIAL_STORE",
        default_value = ".kiln/credentials.json",
        help = "Credential store file used to reuse provider credentials across sessions"
    )]
    pub credential_store: PathBuf,

    #[arg(
        long = "credential-store-key",
        env = "KILN_CREDENTIAL_STORE_KEY",
        hide_env_values = true,
        help = "Optional encryption key for credential store entries when keyed encryption is enabled"
    )]
    pub credential_store_key: Option<String>,

    #[arg(
        long = "credential-store-encryption",
        env = "KILN_CREDENTIAL_STORE_ENCRYPTION",
        value_enum,
        default_value_t = CliCredentialStoreEncryptionMode::Auto,
        help = "Credential store encryption mode: auto, none, or keyed"
    )]
    pub credential_store_encryption: CliCredentialStoreEncryptionMode,

    #[arg(
        long = "credential",
        value_parser = parse_credential_pair,
        help = "Credential field as KEY=VALUE, submitted when the provider asks for credentials. Repeat in schema order"
    )]
    pub credentials: Vec<(String, String)>,

    #[arg(
        long = "engine-bin",
        env = "KILN_ENGINE_BIN",
        default_value = "juju",
        help = "Provisioning engine executable used for bootstrap, add-model and lookups"
    )]
    pub engine_bin: String,

    #[arg(
        long = "bridge-interface",
        env = "KILN_BRIDGE_INTERFACE",
        default_value = "lxdbr0",
        help = "Network bridge that must exist before bootstrapping a local hypervisor provider"
    )]
    pub bridge_interface: String,

    #[arg(
        long = "telemetry",
        env = "KILN_TELEMETRY",
        value_enum,
        default_value_t = CliTelemetrySink::Log,
        help = "Telemetry sink: off, log (tracing only) or jsonl (append to --telemetry-log)"
    )]
    pub telemetry: CliTelemetrySink,

    #[arg(
        long = "telemetry-log",
        env = "KILN_TELEMETRY_LOG",
        default_value = ".kiln/telemetry.jsonl",
        help = "NDJSON file receiving telemetry records when --telemetry=jsonl"
    )]
    pub telemetry_log: PathBuf,

    #[arg(
        long = "log-filter",
        env = "KILN_LOG",
        help = "tracing filter directive; falls back to RUST_LOG, then warn"
    )]
    pub log_filter: Option<String>,
}
