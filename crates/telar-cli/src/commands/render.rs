//! `telar render`: drive a patch offline and write the output to WAV.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use telar_core::EngineConfig;

/// Arguments for the render command.
#[derive(Args)]
pub struct RenderArgs {
    /// Patch file to render
    pub patch: PathBuf,

    /// Output WAV path
    pub output: PathBuf,

    /// Seconds of audio to render
    #[arg(short, long, default_value_t = 5.0)]
    pub seconds: f64,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 44100.0)]
    pub sample_rate: f32,

    /// Samples per block
    #[arg(long, default_value_t = 64)]
    pub block_size: usize,

    /// Output channel count
    #[arg(long, default_value_t = 2)]
    pub channels: usize,
}

/// Runs the render command.
pub fn run(args: RenderArgs) -> Result<()> {
    let config = EngineConfig {
        input_channels: 0,
        output_channels: args.channels,
        block_size: args.block_size,
        sample_rate: args.sample_rate,
    };
    let (mut engine, _graph) = super::load_patch_file(config, &args.patch)?;

    let spec = hound::WavSpec {
        channels: args.channels as u16,
        sample_rate: args.sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)
        .with_context(|| format!("cannot create {}", args.output.display()))?;

    let total_blocks =
        (args.seconds * f64::from(args.sample_rate) / args.block_size as f64).ceil() as usize;
    let input = vec![0.0f32; args.block_size.max(1)];
    let mut output = vec![0.0f32; args.block_size * args.channels];

    for _ in 0..total_blocks {
        engine.process(&input, &mut output);
        // Channel-major engine output, interleaved WAV frames.
        for frame in 0..args.block_size {
            for channel in 0..args.channels {
                writer.write_sample(output[channel * args.block_size + frame])?;
            }
        }
    }
    writer.finalize()?;

    tracing::info!(
        blocks = total_blocks,
        path = %args.output.display(),
        "render complete"
    );
    println!(
        "rendered {:.2}s to {}",
        total_blocks as f64 * args.block_size as f64 / f64::from(args.sample_rate),
        args.output.display()
    );
    Ok(())
}
