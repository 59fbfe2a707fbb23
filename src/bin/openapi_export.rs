use std::{env, fs, path::PathBuf};

use anyhow::Context;
use haveli_api::openapi::ApiDocV1;
use utoipa::OpenApi;

/// Writes the v1 OpenAPI document for the storefront client generator.
///
/// Usage: `openapi-export [OUTPUT]`, defaulting to `openapi/haveli-api.v1.json`.
fn main() -> anyhow::Result<()> {
    let output_path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("openapi").join("haveli-api.v1.json"));

    let document = ApiDocV1::openapi()
        .to_pretty_json()
        .context("failed to render OpenAPI document")?;

    if let Some(dir) = output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    fs::write(&output_path, document)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    println!("OpenAPI document written to {}", output_path.display());
    Ok(())
}
