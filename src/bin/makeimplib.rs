//! Builds an import library from a JSON manifest.

use std::fs::OpenOptions;

use anyhow::Context;
use implib_writer::ImportManifest;

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 2 {
        println!("Make import library from a JSON manifest");
        println!("usage: makeimplib <input.json> <output.lib>");
        return;
    }
    if let Err(error) = run(&args[0], &args[1]) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run(input: &str, output: &str) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to open input file {input}"))?;
    let manifest = ImportManifest::from_json(&text)?;
    let builder = manifest.build_library()?;

    // Size the output up front and write the archive straight into the
    // mapping.
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(output)
        .with_context(|| format!("failed to create library file {output}"))?;
    file.set_len(builder.data_len())
        .context("failed to allocate space for the output file")?;
    let mut map = unsafe { memmap2::MmapMut::map_mut(&file) }
        .context("failed to map output file for writing")?;
    let mut out: &mut [u8] = &mut map[..];
    builder.write_to(&mut out)?;
    map.flush().context("failed to flush output file")?;
    Ok(())
}
