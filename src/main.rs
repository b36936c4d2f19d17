use clap::Parser;

/// Entry point for the Grendel service discovery tool.
///
/// Polls the Grendel inventory API (over HTTP, HTTPS or its local unix socket)
/// and keeps a Prometheus file_sd target file up to date.
///
/// # Errors
///
/// Returns an error if startup fails (e.g., a malformed custom CA bundle) or
/// discovery stops on a broken host list.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info grendel-sd --grendel.endpoint /var/grendel/grendel-api.socket --output.file /etc/prometheus/grendel_sd.json
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config = grendel_sd::Config::parse();
    grendel_sd::run(config).await?;
    Ok(())
}
