//! Command-line converter from lilt notation to LilyPond source.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;

#[derive(Parser)]
#[command(name = "lilt2ly", version, about = "Convert lilt notation into LilyPond source")]
struct Cli {
    /// Path of the notation file to read
    input: PathBuf,
    /// Path of the LilyPond file to write
    output: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(_) => {
            eprintln!("Usage: lilt2ly <in_file> <out_file>");
            return ExitCode::FAILURE;
        }
    };
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let music = lilt::parse_music(&text)?;
    let mut out = Vec::new();
    lilt::export_to_lilypond(&mut out, music)?;
    fs::File::create(&cli.output)
        .and_then(|mut file| file.write_all(&out))
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    Ok(())
}
