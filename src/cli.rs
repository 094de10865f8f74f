//! Command Line Interface (CLI) arguments.

use byte_unit::Byte;
use clap::Parser;

/// Ensemble summary service command line interface
#[derive(Clone, Debug, Parser)]
#[command(version, about)]
pub struct CommandLineArgs {
    /// The IP address on which the service should listen
    #[arg(long, default_value = "0.0.0.0", env = "EPISUMMARY_HOST")]
    pub host: String,
    /// The port to which the service should bind
    #[arg(long, default_value_t = 8080, env = "EPISUMMARY_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "EPISUMMARY_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/episummary/certs/cert.pem",
        env = "EPISUMMARY_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/episummary/certs/key.pem",
        env = "EPISUMMARY_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for operations to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "EPISUMMARY_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "EPISUMMARY_USE_RAYON")]
    pub use_rayon: bool,
    /// Maximum number of concurrent operations. Defaults to one less than the number of CPUs.
    #[arg(long, env = "EPISUMMARY_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    /// Memory limit for request data, e.g. 512MiB. Unlimited if not set.
    #[arg(long, env = "EPISUMMARY_MEMORY_LIMIT", value_parser = parse_memory_limit)]
    pub memory_limit: Option<usize>,
}

/// Parse a human readable size such as `1GiB` into a number of bytes.
fn parse_memory_limit(value: &str) -> Result<usize, String> {
    let bytes = Byte::parse_str(value, true).map_err(|err| err.to_string())?;
    usize::try_from(bytes.as_u64()).map_err(|err| err.to_string())
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
