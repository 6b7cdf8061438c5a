//! Photo operations CLI tool
//!
//! Command-line front end for the photo-ops library with support for the Tract
//! and ONNX Runtime backends.

#[cfg(feature = "cli")]
use photo_ops::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
