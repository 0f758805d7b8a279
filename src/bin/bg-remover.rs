//! Background Removal CLI Tool
//!
//! Compresses, uploads and stores background-removed images using the
//! bg-remover library.

#[cfg(feature = "cli")]
use bg_remover::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
