use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "phosphor",
    author,
    version,
    about = "CRT display simulator: a test card seen through a phosphor dot mask"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file to load instead of the discovered `phosphor.toml`.
    #[arg(long, value_name = "FILE", env = "PHOSPHOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Vertex shader file, or `builtin:crt.vert`.
    #[arg(long, value_name = "SHADER")]
    pub vertex: Option<String>,

    /// Fragment shader file, or `builtin:crt.frag`.
    #[arg(long, value_name = "SHADER")]
    pub fragment: Option<String>,

    /// Test card image (SVG, PNG, JPEG, BMP or GIF).
    #[arg(long, value_name = "PATH")]
    pub testcard: Option<PathBuf>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Seed for the dithering jitter; frames become reproducible.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Present without waiting for vertical sync.
    #[arg(long)]
    pub no_vsync: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect configuration discovery.
    Config(ConfigCommand),
    /// Compile and link the shader pair without opening a window.
    Check,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration directory and file.
    Where,
    /// Print the effective configuration (file plus flags) as TOML.
    Show,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{trimmed}'; expected WIDTHxHEIGHT"))?;
    let parse = |part: &str| -> Result<u32, String> {
        let parsed: u32 = part
            .trim()
            .parse()
            .map_err(|_| format!("invalid dimension '{part}' in size '{trimmed}'"))?;
        if parsed == 0 {
            return Err(format!("size '{trimmed}' must not have a zero dimension"));
        }
        Ok(parsed)
    };
    Ok((parse(width)?, parse(height)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size(" 800X600 "), Ok((800, 600)));
    }

    #[test]
    fn rejects_malformed_sizes() {
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x600").is_err());
        assert!(parse_size("axb").is_err());
        assert!(parse_size("-1x5").is_err());
    }

    #[test]
    fn flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from([
            "phosphor", "--size", "640x480", "--seed", "9", "--no-vsync", "config", "show",
        ])
        .expect("valid arguments");
        assert_eq!(cli.run.size, Some((640, 480)));
        assert_eq!(cli.run.seed, Some(9));
        assert!(cli.run.no_vsync);
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand {
                action: ConfigAction::Show
            }))
        ));
    }

    #[test]
    fn verifies_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
