//! Protobuf code generator for vector tile types.
//!
//! Run with: `cargo run -p tessera-proto --bin generate`

use std::{env, fs, io, path::PathBuf, process::Command};

fn main() -> io::Result<()> {
    let manifest_dir = PathBuf::from(
        env::var("CARGO_MANIFEST_DIR").map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?,
    );
    let proto_dir_path = manifest_dir.join("proto");
    let proto_path = proto_dir_path.join("vector_tile.proto");
    let out_dir = manifest_dir.join("src/generated");

    println!("Generating protobuf code from: {}", proto_path.display());
    println!("Output directory: {}", out_dir.display());

    fs::create_dir_all(&out_dir)?;

    prost_build::Config::new()
        .out_dir(&out_dir)
        .compile_protos(&[&proto_path], &[proto_dir_path])?;

    // The proto package is `vector_tile`, so prost writes `vector_tile.rs`.
    // Fold it into mod.rs so the crate root can `mod generated;` it.
    let generated_file = out_dir.join("vector_tile.rs");
    if !generated_file.exists() {
        eprintln!("Warning: Expected generated file not found: {generated_file:?}");
        for entry in fs::read_dir(&out_dir)? {
            eprintln!("  {:?}", entry?.path());
        }
        return Ok(());
    }

    let content = fs::read_to_string(&generated_file)?;
    let mod_content = format!(
        "// Generated protobuf types. Do not edit manually.\n\
         // Regenerate with: cargo run -p tessera-proto --bin generate\n\n\
         #![allow(clippy::doc_markdown)]\n\
         #![allow(clippy::must_use_candidate)]\n\n\
         {content}"
    );
    let mod_rs_path = out_dir.join("mod.rs");
    fs::write(&mod_rs_path, mod_content)?;
    fs::remove_file(&generated_file)?;

    let status = Command::new("rustfmt").arg(&mod_rs_path).status()?;
    if !status.success() {
        eprintln!("Warning: rustfmt failed with status: {status}");
    }

    println!("Successfully generated protobuf types!");
    Ok(())
}
