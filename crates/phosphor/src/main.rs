mod cli;
mod config;
mod paths;
mod run;

use anyhow::{Context, Result};
use cli::{Command, ConfigAction, RunArgs};
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(config_cmd)) => handle_config_command(config_cmd.action, &cli.run),
        Some(Command::Check) => run::check(cli.run),
        None => run::run(cli.run),
    }
}

fn handle_config_command(action: ConfigAction, args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    match action {
        ConfigAction::Where => {
            let file = paths.config_file();
            println!("config dir:  {}", paths.config_dir().display());
            println!(
                "config file: {} ({})",
                file.display(),
                if file.is_file() { "present" } else { "missing" }
            );
            if let Some(explicit) = &args.config {
                println!("override:    {}", explicit.display());
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = run::effective_config(&paths, args)?;
            let text = config
                .to_toml()
                .context("failed to serialise configuration")?;
            print!("{text}");
            Ok(())
        }
    }
}
