mod color;
mod config;
mod data;
mod error;
mod server;
mod setups;
mod state;
mod ui;

#[cfg(test)]
mod testutil;

use anyhow::Context;
use clap::Parser;

use config::Cli;
use data::loader::SourceFile;
use setups::SetupStore;
use state::Dashboard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let setups = match &cli.setups_file {
        Some(path) => SetupStore::open(path)
            .with_context(|| format!("opening setups file {}", path.display()))?,
        None => SetupStore::in_memory(),
    };
    if !setups.is_empty() {
        log::info!("{} saved setups available", setups.len());
    }

    // Bind before loading anything so a busy port fails fast.
    let listener = server::bind(cli.addr()).await?;

    let mut dashboard = Dashboard::new(setups);
    if let Some(path) = &cli.file {
        let source = SourceFile::open(path)
            .with_context(|| format!("loading {}", path.display()))?;
        dashboard.upload(Ok(source))?;
        let sheet = cli.sheet.clone().or_else(|| dashboard.default_sheet());
        if let Some(sheet) = sheet {
            dashboard
                .select_sheet(&sheet)
                .with_context(|| format!("loading sheet '{sheet}' of {}", path.display()))?;
        }
    }

    server::serve(listener, dashboard, cli.max_upload_bytes()).await?;
    Ok(())
}
