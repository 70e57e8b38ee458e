//! Core application

use std::sync::Arc;

use anyhow::Result;

use crate::api::ApiServer;
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::{LoadReport, TableLoader, TableRegistry};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub registry: Arc<TableRegistry>,
    pub loader: Arc<TableLoader>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let (cli_config, command) = cli::parse();
        Self::init_logging(cli_config.debug);

        tracing::debug!("Application starting");
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Check) => Self::check(&cli_config).await,
            Some(Commands::Start) | None => {
                let (app, report) = Self::init(&cli_config).await?;
                Self::log_report(&report);
                Self::start_server(app).await
            }
        }
    }

    async fn init(cli: &CliConfig) -> Result<(Self, LoadReport)> {
        let config = AppConfig::load(cli)?;
        let registry = Arc::new(TableRegistry::new());
        let loader = Arc::new(TableLoader::new(
            config.tables.dirs.clone(),
            config.remote.client_options(),
        ));

        let report = loader.load_into(&registry).await;

        let app = Self {
            shutdown: ShutdownService::new(),
            config,
            registry,
            loader,
        };
        Ok((app, report))
    }

    /// Load every table file once and fail if any is broken
    async fn check(cli: &CliConfig) -> Result<()> {
        let (_, report) = Self::init(cli).await?;

        for name in &report.loaded {
            println!("ok      {}", name);
        }
        for (path, error) in &report.failed {
            println!("failed  {}: {}", path.display(), error);
        }

        if !report.is_clean() {
            anyhow::bail!("{} table file(s) failed to load", report.failed.len());
        }
        println!("{} table(s) loaded", report.loaded.len());
        Ok(())
    }

    fn log_report(report: &LoadReport) {
        if report.loaded.is_empty() && report.failed.is_empty() {
            tracing::warn!("No table files found");
        }
        if !report.is_clean() {
            tracing::warn!(
                failed = report.failed.len(),
                "Some table files failed to load"
            );
        }
        tracing::info!(tables = report.loaded.len(), "Tables loaded");
    }

    fn init_logging(debug: bool) {
        let default_filter = if debug {
            format!("debug,{}=debug", APP_NAME_LOWER)
        } else {
            format!("info,{}=info", APP_NAME_LOWER)
        };

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        let server = ApiServer::new(app);
        let app = server.start().await?;
        tracing::debug!(
            triggered = app.shutdown.is_triggered(),
            "Shutdown complete"
        );

        Ok(())
    }
}
