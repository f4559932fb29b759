use std::fs;

use anyhow::{bail, Context, Result};
use renderer::{Renderer, RendererConfig, ShaderSources, ShaderStage, ShaderText};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::config::{Config, BUILTIN_FRAGMENT, BUILTIN_VERTEX};
use crate::paths::AppPaths;

const BUILTIN_PREFIX: &str = "builtin:";
const CRT_VERTEX: &str = include_str!("../../../shaders/crt.vert");
const CRT_FRAGMENT: &str = include_str!("../../../shaders/crt.frag");

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Discovered config file merged with command-line flags.
pub fn effective_config(paths: &AppPaths, args: &RunArgs) -> Result<Config> {
    let discovered = paths.config_file();
    let mut config = Config::resolve(args.config.as_deref(), &discovered)
        .with_context(|| match &args.config {
            Some(path) => format!("failed to load configuration {}", path.display()),
            None => format!("failed to load configuration {}", discovered.display()),
        })?;
    config.apply_overrides(args);
    config
        .validate()
        .context("command-line flags produced an invalid configuration")?;
    Ok(config)
}

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config = effective_config(&paths, &args)?;
    let renderer_config = build_renderer_config(&config)?;

    let mut renderer = Renderer::new(renderer_config);
    renderer.run().context("crt simulator stopped")
}

pub fn check(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config = effective_config(&paths, &args)?;
    let shaders = load_shaders(&config)?;
    renderer::validate_shaders(&shaders).context("shader program is invalid")?;
    println!(
        "shader program OK ({} + {})",
        shaders.vertex.origin, shaders.fragment.origin
    );
    Ok(())
}

fn build_renderer_config(config: &Config) -> Result<RendererConfig> {
    Ok(RendererConfig {
        title: config.window.title.clone(),
        surface_size: (config.window.width, config.window.height),
        shaders: load_shaders(config)?,
        testcard: config.assets.testcard.clone(),
        seed: config.render.seed,
        vsync: config.render.vsync,
    })
}

fn load_shaders(config: &Config) -> Result<ShaderSources> {
    Ok(ShaderSources {
        vertex: load_shader(&config.assets.vertex, ShaderStage::Vertex)?,
        fragment: load_shader(&config.assets.fragment, ShaderStage::Fragment)?,
    })
}

/// Retrieves shader text by identifier: a `builtin:` name or a file path.
pub fn load_shader(identifier: &str, stage: ShaderStage) -> Result<ShaderText> {
    if identifier.starts_with(BUILTIN_PREFIX) {
        let source = match identifier {
            BUILTIN_VERTEX => CRT_VERTEX,
            BUILTIN_FRAGMENT => CRT_FRAGMENT,
            other => bail!(
                "unknown built-in shader '{other}'; available: {BUILTIN_VERTEX}, {BUILTIN_FRAGMENT}"
            ),
        };
        return Ok(ShaderText::new(identifier, stage, source));
    }

    let source = fs::read_to_string(identifier)
        .with_context(|| format!("failed to read {stage} shader {identifier}"))?;
    tracing::debug!(path = identifier, %stage, "loaded shader text");
    Ok(ShaderText::new(identifier, stage, source))
}
