//! MonoSwitch daemon entry point.
//!
//! Wires together the infrastructure services and starts the Tokio async
//! runtime:
//!
//! ```text
//! main()
//!  └─ load_config / profiles_from_config
//!  └─ start services
//!       ├─ WindowsDisplayApi + DisplayConfigurator
//!       ├─ WindowsHotkeyPump  (Win32 message-loop thread)
//!       └─ ActivationService::run_hotkey_loop (Tokio task, until Ctrl-C)
//! ```
//!
//! The tray/menu UI is a separate front end; headless operation drives the
//! same [`ActivationService`] the UI would.

use tracing::info;
use tracing_subscriber::EnvFilter;

use monoswitch_app::infrastructure::storage::config::{load_config, profiles_from_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // Initialise structured logging.  `RUST_LOG` overrides the config value.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.daemon.log_level.clone())),
        )
        .init();

    info!("MonoSwitch starting");

    let profiles = profiles_from_config(&config)?;
    info!(profiles = profiles.len(), "profiles loaded");

    run(config, profiles).await
}

#[cfg(target_os = "windows")]
async fn run(
    config: monoswitch_app::infrastructure::storage::config::AppConfig,
    profiles: Vec<monoswitch_core::Profile>,
) -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use monoswitch_app::application::activation::ActivationService;
    use monoswitch_app::application::apply_profile::DisplayConfigurator;
    use monoswitch_app::application::cancel::cancel_pair;
    use monoswitch_app::application::hotkey_service::HotkeyService;
    use monoswitch_app::application::snapshot::current_display_information;
    use monoswitch_app::infrastructure::display_api::windows::WindowsDisplayApi;
    use monoswitch_app::infrastructure::display_api::DisplayApi;
    use monoswitch_app::infrastructure::hotkey::windows::WindowsHotkeyPump;
    use monoswitch_app::infrastructure::hotkey::HotkeyBackend;
    use tracing::{error, warn};

    let api: Arc<dyn DisplayApi> = Arc::new(WindowsDisplayApi::new());

    // Dump the current arrangement so users have the display ids at hand
    // when writing profile entries.
    match current_display_information(api.as_ref()) {
        Ok(dump) => info!("current displays:\n{dump}"),
        Err(e) => warn!(error = %e, "could not read current display configuration"),
    }

    let configurator = Arc::new(DisplayConfigurator::new(Arc::clone(&api)));
    let backend: Arc<dyn HotkeyBackend> = Arc::new(WindowsHotkeyPump::new());
    let hotkeys = match HotkeyService::new(backend) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!(error = %e, "failed to start hotkey service");
            return Err(e.into());
        }
    };
    let activation = Arc::new(ActivationService::with_lock_timeout(
        profiles,
        configurator,
        Duration::from_millis(config.daemon.activation_timeout_ms),
    ));

    let (cancel_handle, cancel_signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            cancel_handle.cancel();
        }
    });

    info!("MonoSwitch ready.  Press Ctrl-C to exit.");
    activation.run_hotkey_loop(&hotkeys, &cancel_signal).await;

    hotkeys.shutdown();
    info!("MonoSwitch stopped");
    Ok(())
}

#[cfg(not(target_os = "windows"))]
async fn run(
    _config: monoswitch_app::infrastructure::storage::config::AppConfig,
    _profiles: Vec<monoswitch_core::Profile>,
) -> anyhow::Result<()> {
    anyhow::bail!("monoswitch drives the Windows display configuration APIs; this platform is not supported")
}
