//! CLI entrypoint for the assayer fleet inventory collector.

use clap::{Parser, Subcommand};

mod outofband;

#[derive(Parser)]
#[command(name = asset_model::APP_NAME, version)]
#[command(about = "Collect and reconcile fleet hardware inventory through server BMCs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect inventory and BIOS configuration data through the BMC.
    Outofband(outofband::Args),
    /// Print build information.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Outofband(args) => outofband::run(args).await,
        Commands::Version => {
            println!("{}", build_info());
            Ok(())
        }
    }
}

/// Name, semver and the commit/branch the binary was built from. The
/// build identifiers come from the release pipeline environment; local
/// builds fall back to "unknown".
fn build_info() -> String {
    format!(
        "{} v{} (commit: {}, branch: {})",
        asset_model::APP_NAME,
        env!("CARGO_PKG_VERSION"),
        option_env!("ASSAYER_BUILD_COMMIT").unwrap_or("unknown"),
        option_env!("ASSAYER_BUILD_BRANCH").unwrap_or("unknown"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_names_app_version_and_commit() {
        let info = build_info();
        assert!(info.contains(asset_model::APP_NAME));
        assert!(info.contains(env!("CARGO_PKG_VERSION")));
        assert!(info.contains("commit:"));
        assert!(info.contains("branch:"));
    }
}
