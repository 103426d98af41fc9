use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// `--log-filter` wins over `RUST_LOG`; both fall back to warn.
pub(crate) fn init_tracing(directives: Option<&str>) {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::WARN.into());
    let env_filter = match directives {
        Some(directives) => builder.parse_lossy(directives),
        None => builder.from_env_lossy(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
