//! Dumps the exported symbols of a DLL as an implib manifest.

use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("USAGE: dumpsyms file [output] [/COMPACT]");
        std::process::exit(1);
    }
    if let Err(error) = run(&args) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> anyhow::Result<()> {
    let filename = &args[0];
    let output = if args.len() > 1 && !args[1].starts_with('/') {
        args[1].clone()
    } else {
        format!("{filename}.txt")
    };
    let compact = args[1..].iter().any(|arg| arg == "/COMPACT");

    let file = std::fs::File::open(filename)
        .with_context(|| format!("\"{filename}\": file locked or not found"))?;
    let image =
        unsafe { memmap2::Mmap::map(&file) }.with_context(|| format!("failed to map {filename}"))?;
    let exports = implib_writer::read_exports(&image)
        .with_context(|| format!("\"{filename}\""))?;

    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.clone());
    let mut out = BufWriter::new(
        std::fs::File::create(&output).context("error opening the output file")?,
    );
    implib_writer::write_manifest(&mut out, filename, &stem, &exports, compact)?;
    out.flush()?;
    Ok(())
}
