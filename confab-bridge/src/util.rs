use directories::ProjectDirs;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "CONFAB_CONFIG";

pub fn init_tracing() {
    // RUST_LOG=confab_core=debug,confab_hive=trace
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout is the rendered console.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact()
        .try_init();
}

pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<non-string panic payload>");

        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "<unknown>".to_string());

        tracing::error!(%location, %payload, "panic");
    }));
}

/// Where the config file lives on this machine, if anywhere.
pub fn config_path() -> Option<PathBuf> {
    let config_dir = ProjectDirs::from("", "", "confab").map(|dirs| dirs.config_dir().to_path_buf());
    resolve_config_path(std::env::var_os(CONFIG_ENV), config_dir)
}

/// An explicit, non-empty override wins over the platform config dir.
pub fn resolve_config_path(
    override_path: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    match override_path.filter(|p| !p.is_empty()) {
        Some(path) => Some(PathBuf::from(path)),
        None => config_dir.map(|dir| dir.join("config.json")),
    }
}
