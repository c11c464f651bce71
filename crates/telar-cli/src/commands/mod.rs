//! CLI subcommands.

pub mod info;
pub mod render;

use std::path::Path;

use anyhow::{Context, Result};
use telar_core::{ConsoleMessage, Engine, EngineConfig, GraphId};
use telar_registry::ObjectRegistry;

/// Builds an engine whose console goes to the terminal and loads a patch
/// file into it.
pub fn load_patch_file(config: EngineConfig, path: &Path) -> Result<(Engine, GraphId)> {
    let mut engine = Engine::with_console(
        config,
        Box::new(|message| match message {
            ConsoleMessage::Print(text) => println!("{text}"),
            ConsoleMessage::Error(text) => eprintln!("error: {text}"),
            ConsoleMessage::DspActive(on) => eprintln!("dsp: {}", if on { "on" } else { "off" }),
        }),
    );
    let registry = ObjectRegistry::new();
    let directory = path.parent().unwrap_or(Path::new("."));
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .context("patch path has no file name")?;
    let graph = telar_parser::load_patch(&mut engine, &registry, directory, filename)
        .with_context(|| format!("failed to load {}", path.display()))?;
    engine.attach_graph(graph)?;
    Ok((engine, graph))
}
