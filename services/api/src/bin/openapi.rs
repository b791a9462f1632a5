//! services/api/src/bin/openapi.rs
//!
//! Writes the classroom REST API's OpenAPI document to disk, for client
//! generation. Usage: `openapi [PATH]` (defaults to `openapi.json`).

use classroom_api::web::rest::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_PATH: &str = "openapi.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PATH.to_string());

    let document = ApiDoc::openapi();
    std::fs::write(&path, document.to_pretty_json()?)?;
    println!(
        "Wrote {} paths of the classroom API to {}",
        document.paths.paths.len(),
        path
    );
    Ok(())
}
