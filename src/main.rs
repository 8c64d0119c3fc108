use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{LevelFilter, error, info};

use grin::{Summary, decode_file, encode_file};

#[derive(Parser)]
#[command(name = "grin", version)]
#[command(about = "Compress and decompress files with Huffman coding.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Do not print the summary
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress <input> into a .grin file
    Encode { input: PathBuf, output: PathBuf },
    /// Decompress a .grin file
    Decode { input: PathBuf, output: PathBuf },
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn print_summary(action: &str, input: &Path, output: &Path, summary: &Summary, encoded: bool) {
    println!(
        "\r\n✅ {} successful.\n\
         📂  Input:       {} ({} bytes)\n\
         💾  Output:      {} ({} bytes)\n\
         ℹ️  Entropy:     {:.4} bits/symbol\n\
         🗜️  Ratio:       {:.2}%",
        action,
        input.display(),
        summary.input_bytes,
        output.display(),
        summary.output_bytes,
        summary.entropy,
        summary.ratio(encoded)
    );
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    info!("--- Start ---");
    let (action, input, output, encoded, result) = match &cli.command {
        Commands::Encode { input, output } => {
            ("Encoding", input, output, true, encode_file(input, output))
        }
        Commands::Decode { input, output } => {
            ("Decoding", input, output, false, decode_file(input, output))
        }
    };

    match result {
        Ok(summary) => {
            if !cli.quiet {
                print_summary(action, input, output, &summary, encoded);
            }
            info!("--- End ---");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{} {} failed: {}", action, input.display(), e);
            ExitCode::FAILURE
        }
    }
}
