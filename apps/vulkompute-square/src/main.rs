//! Square Array Demo
//!
//! Uploads `0..N` to the GPU, squares every element in a compute shader and
//! reads the result back.
//!
//! ## Usage
//!
//! ```bash
//! glslc apps/vulkompute-square/shaders/square.comp -o apps/vulkompute-square/shaders/square.spv
//! cargo run -p vulkompute-square -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `-s, --shader <PATH>`: Compiled SPIR-V kernel (default: `shaders/square.spv`)
//! - `-n, --count <N>`: Number of elements (default: 10, at most the device's
//!   compute workgroup limit)
//! - `--validation`: Enable the Khronos validation layer
//! - `--pooled`: Use pooled, persistently mapped buffers instead of staging copies
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod square;

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vulkompute_gpu::{ComputeManager, ManagerConfig};

const DEFAULT_COUNT: u32 = 10;

/// Parsed command line options.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Options {
    shader: PathBuf,
    count: u32,
    validation: bool,
    pooled: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            shader: square::default_shader_path(),
            count: DEFAULT_COUNT,
            validation: false,
            pooled: false,
        }
    }
}

impl Options {
    /// Parse from a slice of arguments, the first being the program name.
    fn parse_args(args: &[String]) -> Self {
        let mut options = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-s" | "--shader" => {
                    if i + 1 < args.len() {
                        options.shader = PathBuf::from(&args[i + 1]);
                        i += 1;
                    }
                }
                "-n" | "--count" => {
                    if i + 1 < args.len() {
                        match args[i + 1].parse() {
                            Ok(count) if count > 0 && count <= square::MAX_COUNT => {
                                options.count = count;
                            }
                            _ => tracing::warn!("Ignoring invalid count {:?}", args[i + 1]),
                        }
                        i += 1;
                    }
                }
                "--validation" => {
                    options.validation = true;
                }
                "--pooled" => {
                    options.pooled = true;
                }
                other => {
                    tracing::warn!("Ignoring unknown argument {other:?}");
                }
            }
            i += 1;
        }

        options
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = Options::parse_args(&args);

    let config = ManagerConfig::new("vulkompute-square").with_validation(options.validation);
    let manager = ComputeManager::new(config)?;
    tracing::info!("Running on {}", manager.device_name());

    let max_groups = manager.capabilities().max_compute_workgroup_count[0];
    square::workgroup_count(options.count as usize, max_groups)?;
    let input = square::input(options.count);
    let output = if options.pooled {
        square::run_pooled(&manager, &options.shader, &input)?
    } else {
        square::run_staged(&manager, &options.shader, &input)?
    };

    square::verify(&input, &output)?;
    println!("{output:?}");

    Ok(())
}

fn print_help() {
    eprintln!(
        "Vulkompute Square Array Demo

USAGE:
    cargo run -p vulkompute-square -- [OPTIONS]

OPTIONS:
    -s, --shader <PATH>     Compiled SPIR-V kernel
                            Default: apps/vulkompute-square/shaders/square.spv
    -n, --count <N>         Number of elements (default: {DEFAULT_COUNT})
    --validation            Enable the Khronos validation layer
    --pooled                Use pooled, persistently mapped buffers
    -h, --help              Print this help message

BUILDING THE KERNEL:
    glslc apps/vulkompute-square/shaders/square.comp -o apps/vulkompute-square/shaders/square.spv

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
