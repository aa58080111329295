mod sync;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "glucosync")]
#[command(about = "Copy new LibreLinkUp glucose readings into Firestore")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    sync: SyncArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync pass (the default when no command is given).
    Sync(SyncArgs),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Args)]
struct SyncArgs {
    /// Fetch and normalize, but do not query or write the store.
    #[arg(long)]
    dry_run: bool,

    /// Print sampling-gap statistics (same as `DEBUG_INTERVALS=1`).
    #[arg(long)]
    debug_intervals: bool,
}

impl Cli {
    /// Flags given before or after `sync` both count.
    fn sync_args(&self) -> SyncArgs {
        match self.command {
            Some(Commands::Sync(args)) => SyncArgs {
                dry_run: args.dry_run || self.sync.dry_run,
                debug_intervals: args.debug_intervals || self.sync.debug_intervals,
            },
            None => self.sync,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = glucosync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let outcome = sync::run_sync(&config, cli.sync_args()).await?;
    println!("{outcome}");
    Ok(())
}
