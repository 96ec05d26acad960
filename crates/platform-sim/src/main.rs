use anyhow::Result;
use clap::Parser;
use platform_sim::app::Application;
use platform_sim::config::Cli;
use platform_sim::config::Commands;
use platform_sim::config::DaemonArgs;
use platform_sim::logging;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => run_daemon(*daemon_args).await,
    }
}

async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    let _guard = logging::init(daemon_args.log_file.as_deref())?;

    tracing::info!("Starting platform-sim daemon {}", env!("CARGO_PKG_VERSION"));

    let app = Application::build(daemon_args).await?;

    app.run().await?;
    app.shutdown().await?;

    Ok(())
}
