//! Server configuration, sourced from CLI flags and environment variables.
//!
//! Every flag can also be supplied via environment variable (and therefore a
//! `.env` file), with the flag taking precedence. `CliArgs` is the raw parsed
//! input; [`ServerConfig`] is the validated form the rest of the server
//! consumes.

use clap::Parser;

/// Command-line arguments for the greet server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "greet-tonic-server",
    version,
    about = "A demonstration gRPC greeting service"
)]
pub struct CliArgs {
    /// TCP address the server listens on.
    #[arg(long, env = "GREET_ADDR", default_value = "0.0.0.0:50051")]
    pub addr: String,

    /// Capacity of the outbound response channel for streaming calls.
    #[arg(long, env = "GREET_STREAM_BUFFER_SIZE", default_value_t = 16)]
    pub stream_buffer_size: usize,

    /// Artificial processing delay for the unary Greet call, in milliseconds.
    #[arg(long, env = "GREET_UNARY_DELAY_MS", default_value_t = 500)]
    pub unary_delay_ms: u64,

    /// Exclusive upper bound of the random per-response delay in
    /// GreetManyTimes, in milliseconds.
    #[arg(long, env = "GREET_FAN_OUT_JITTER_MS", default_value_t = 100)]
    pub fan_out_jitter_ms: u64,

    /// How long shutdown waits for in-flight streams to drain, in seconds.
    #[arg(long, env = "GREET_SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub stream_buffer_size: usize,
    pub unary_delay_ms: u64,
    pub fan_out_jitter_ms: u64,
    pub shutdown_timeout_secs: u64,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            anyhow::bail!("stream buffer size must be greater than 0");
        }

        Ok(Self {
            server_addr: args.addr,
            stream_buffer_size: args.stream_buffer_size,
            unary_delay_ms: args.unary_delay_ms,
            fan_out_jitter_ms: args.fan_out_jitter_ms,
            shutdown_timeout_secs: args.shutdown_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_and_validate() {
        let args = CliArgs::parse_from(["greet-tonic-server"]);
        let config = ServerConfig::try_from(args).unwrap();

        assert_eq!(config.server_addr, "0.0.0.0:50051");
        assert_eq!(config.stream_buffer_size, 16);
        assert_eq!(config.unary_delay_ms, 500);
        assert_eq!(config.fan_out_jitter_ms, 100);
    }

    #[test]
    fn zero_stream_buffer_is_rejected() {
        let args = CliArgs::parse_from(["greet-tonic-server", "--stream-buffer-size", "0"]);
        assert!(ServerConfig::try_from(args).is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let args = CliArgs::parse_from([
            "greet-tonic-server",
            "--addr",
            "127.0.0.1:9000",
            "--unary-delay-ms",
            "10",
        ]);
        let config = ServerConfig::try_from(args).unwrap();

        assert_eq!(config.server_addr, "127.0.0.1:9000");
        assert_eq!(config.unary_delay_ms, 10);
    }
}
