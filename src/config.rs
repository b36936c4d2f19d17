use std::path::PathBuf;
use std::time::Duration;

/// Command line configuration for the Grendel file_sd generator.
///
/// Built once at startup and handed by reference to
/// [`TransportBuilder`](crate::transport::TransportBuilder) and
/// [`Discoverer`](crate::discovery::Discoverer).
#[derive(Debug, Clone, clap::Parser)]
#[command(
    name = "grendel-sd",
    about = "Tool to generate file_sd target files for Grendel."
)]
pub struct Config {
    /// Output file for file_sd compatible file.
    #[arg(long = "output.file", default_value = "grendel_sd.json")]
    pub output_file: PathBuf,

    /// The refresh interval (in seconds).
    #[arg(long = "target.refresh", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_secs: u64,

    /// Node exporter port
    #[arg(long = "grendel.node_exporter_port", default_value_t = 9100)]
    pub node_exporter_port: u16,

    /// The address the grendel HTTP API is listening on for requests.
    #[arg(
        long = "grendel.endpoint",
        default_value = "/var/grendel/grendel-api.socket"
    )]
    pub endpoint: String,

    /// Path to grendel custom CA
    #[arg(long = "grendel.capath")]
    pub ca_path: Option<PathBuf>,

    /// Maximum number of retries per inventory request.
    #[arg(long = "grendel.retry_max", default_value_t = 4)]
    pub retry_max: u32,

    /// Timeout (in seconds) of a single inventory request.
    #[arg(long = "grendel.timeout", default_value_t = 3600)]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_file: PathBuf::from("grendel_sd.json"),
            refresh_secs: 60,
            node_exporter_port: 9100,
            endpoint: "/var/grendel/grendel-api.socket".to_owned(),
            ca_path: None,
            retry_max: 4,
            request_timeout_secs: 3600,
        }
    }
}
