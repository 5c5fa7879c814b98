// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use clap::Parser;
use kasca_server::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { logging, command } = Cli::parse();
    logging.init("kasca-server")?;
    command.run().await
}
