use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;

/// Initialize console logging.
///
/// The level comes from `RUST_LOG` (default `info`); the terrain crate itself
/// logs at `debug` unless the environment filter says otherwise.
pub fn init_logging() {
    init_logging_with_file(None::<&Path>);
}

/// Initialize console logging plus an optional plain-text log file.
///
/// An existing file at `log_path` is replaced so each session starts clean.
pub fn init_logging_with_file<P: AsRef<Path>>(log_path: Option<P>) {
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let enable_backtrace = env::var("RUST_BACKTRACE").unwrap_or_else(|_| "0".to_string()) == "1";

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&log_level);
        if let Ok(directive) = "heightfield_terrain=debug".parse() {
            filter = filter.add_directive(directive);
        }
        if let Ok(directive) = "wgpu_core=warn".parse() {
            filter = filter.add_directive(directive);
        }
        filter
    });

    let console = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true);

    let file_layer = log_path.and_then(|path| {
        let path = path.as_ref();
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                eprintln!("Warning: Failed to remove existing {}: {}", path.display(), e);
            }
        }
        match fs::File::create(path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .boxed(),
            ),
            Err(e) => {
                eprintln!("Warning: Failed to create {}: {}", path.display(), e);
                None
            }
        }
    });
    let file_enabled = file_layer.is_some();

    // A second init (tests, embedding applications) keeps the first subscriber.
    if tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        return;
    }

    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("Panic occurred: {}", panic_info);

        if let Some(location) = panic_info.location() {
            tracing::error!(
                "Panic location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }

        if enable_backtrace {
            tracing::error!("Backtrace:\n{:?}", std::backtrace::Backtrace::capture());
        }
    }));

    tracing::info!("Logging initialized with level: {}", log_level);
    tracing::info!("File logging enabled: {}", file_enabled);
}

/// Log wgpu adapter information
pub fn log_adapter_info(adapter: &wgpu::Adapter) {
    let info = adapter.get_info();
    tracing::info!("=== WGPU Adapter Information ===");
    tracing::info!("Name: {}", info.name);
    tracing::info!("Backend: {:?}", info.backend);
    tracing::info!("Device Type: {:?}", info.device_type);
    tracing::info!("Driver: {}", info.driver);
    tracing::info!("=================================");
}
