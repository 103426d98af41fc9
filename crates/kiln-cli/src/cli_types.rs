use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliCredentialStoreEncryptionMode {
    Auto,
    None,
    Keyed,
}

/// Provider kind as declared on the command line.
///
/// `Auto` defers to the provider-name table in `kiln-provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliProviderKind {
    Auto,
    GenericCloud,
    LocalHypervisor,
    BareMetal,
    SharedController,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliTelemetrySink {
    Off,
    Log,
    Jsonl,
}
