//! `telar info`: load a patch and report its structure.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use telar_core::EngineConfig;

/// Arguments for the info command.
#[derive(Args)]
pub struct InfoArgs {
    /// Patch file to inspect
    pub patch: PathBuf,

    /// Sample rate used for loading
    #[arg(long, default_value_t = 44100.0)]
    pub sample_rate: f32,
}

/// Runs the info command.
pub fn run(args: InfoArgs) -> Result<()> {
    let config = EngineConfig {
        input_channels: 2,
        output_channels: 2,
        block_size: 64,
        sample_rate: args.sample_rate,
    };
    let (engine, graph) = super::load_patch_file(config, &args.patch)?;

    let g = engine.graph(graph)?;
    println!("patch: {}", args.patch.display());
    println!("entries: {}", g.entries().len());
    println!("dsp objects in process order: {}", g.process_order().len());
    println!("boundary inlets: {}", g.inlet_objects().len());
    println!("boundary outlets: {}", g.outlet_objects().len());
    Ok(())
}
