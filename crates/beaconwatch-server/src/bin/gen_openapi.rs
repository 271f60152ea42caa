//! Generates the OpenAPI specification to a JSON file.
//!
//! Run with: cargo run --bin gen-openapi -p beaconwatch-server
//!
//! The file is written to the workspace root, or to the path given as the
//! first argument.

use std::fs;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    println!("Generating OpenAPI specification...\n");

    let json = beaconwatch_server::api::get_openapi_json()?;

    let output_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            manifest_dir
                .parent()
                .and_then(|p| p.parent())
                .ok_or_else(|| anyhow::anyhow!("Could not find workspace root"))?
                .join("openapi.json")
        }
    };

    fs::write(&output_path, &json)?;
    println!("Written to: {}", output_path.display());

    let spec: serde_json::Value = serde_json::from_str(&json)?;
    if let Some(paths) = spec.get("paths").and_then(|p| p.as_object()) {
        println!("Paths: {}", paths.len());
    }
    if let Some(schemas) = spec
        .pointer("/components/schemas")
        .and_then(|s| s.as_object())
    {
        println!("Schemas: {}", schemas.len());
    }

    println!("\nOpenAPI specification generated successfully!");
    Ok(())
}
