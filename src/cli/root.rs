use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::collections::HashMap;

use crate::app::AppContext;
use crate::cli::args::{Args, Commands};
use crate::cli::commands::{handle_cache_command, handle_history_command, run_scan_command};
use crate::config::EggscanConfig;
use crate::logging::init_logging;

pub struct RootCommand;

impl RootCommand {
    pub async fn execute() -> Result<()> {
        let args = Args::parse();
        init_logging(args.verbosity);

        if args.generate_config {
            println!("{}", EggscanConfig::generate_default_config());
            return Ok(());
        }

        let Some(command) = &args.command else {
            Args::command().print_help()?;
            return Ok(());
        };

        let env_vars: HashMap<String, String> = std::env::vars().collect();
        let config = EggscanConfig::load_with_precedence(args.config.as_deref(), &env_vars)?;
        let mut app = AppContext::from_config(config)?;

        let result = match command {
            Commands::Scan { image } => run_scan_command(&mut app, image).await,
            Commands::History { action } => handle_history_command(action, &mut app),
            Commands::Cache { action } => handle_cache_command(action, &app).await,
        };

        app.shutdown().await;
        result
    }
}
