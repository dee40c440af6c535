use anyhow::bail;
use clap::{ArgAction, Parser, builder::BoolishValueParser};
use core::time::Duration;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use txnid::{ProgressStore, TICK_OVER};

/// Largest accepted `--instance` value.
pub const MAX_START: u16 = 32767;

/// Largest accepted `--increment` value.
pub const MAX_INCREMENT: u16 = 32767;

/// Runtime configuration for the `txnid-server` binary.
///
/// Every setting can come from a CLI flag or an environment variable (a
/// `.env` file in the working directory is loaded first). Flags win over
/// environment variables.
///
/// In a cluster, every instance must run with the same `--increment` (the
/// cluster size) and a distinct `--instance` in `[0, increment)`. Nothing
/// checks this across instances at runtime.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "txnid-server",
    version,
    about = "Runs a transaction ID service: listens on a port, writes one ID per connection, then closes the socket"
)]
pub struct CliArgs {
    /// IP address to listen on. Listens on all interfaces when unset.
    ///
    /// Environment variable: `TXNID_SERVER_LISTENIP`
    #[arg(long, env = "TXNID_SERVER_LISTENIP")]
    pub ip: Option<IpAddr>,

    /// TCP port to listen on.
    ///
    /// Environment variable: `TXNID_SERVER_LISTENPORT`
    #[arg(long, env = "TXNID_SERVER_LISTENPORT", default_value_t = 8963)]
    pub port: u16,

    /// Instance number within the cluster, which is also the starting
    /// counter. Must be below `--increment`.
    ///
    /// Environment variable: `TXNID_SERVER_INSTANCE`
    #[arg(long, env = "TXNID_SERVER_INSTANCE", default_value_t = 0)]
    pub instance: u16,

    /// Step between successive IDs. In a cluster this must be the total
    /// number of instances.
    ///
    /// Environment variable: `TXNID_SERVER_INCREMENT`
    #[arg(long, env = "TXNID_SERVER_INCREMENT", default_value_t = 1)]
    pub increment: u16,

    /// Directory holding the progress file (`txnid.dat`).
    ///
    /// Environment variable: `TXNID_SERVER_CONFDIR`
    #[arg(long, env = "TXNID_SERVER_CONFDIR", default_value = "/etc/txnidserver")]
    pub confdir: PathBuf,

    /// Log start parameters and progress file rollovers. Accepts `1`,
    /// `true`, `yes` or `on` from the environment.
    ///
    /// Environment variable: `TXNID_SERVER_VERBOSE`
    #[arg(short, long, env = "TXNID_SERVER_VERBOSE", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub verbose: bool,

    /// Emit logs as JSON lines instead of human-readable output.
    ///
    /// Environment variable: `TXNID_SERVER_LOG_JSON`
    #[arg(long, env = "TXNID_SERVER_LOG_JSON", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub log_json: bool,

    /// Seconds to wait for in-flight connections after the accept loop
    /// stops.
    ///
    /// Environment variable: `TXNID_SERVER_SHUTDOWN_TIMEOUT`
    #[arg(long, env = "TXNID_SERVER_SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub start: u64,
    pub increment: u16,
    pub confdir: PathBuf,
    pub verbose: bool,
    pub log_json: bool,
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// The progress store under the configured directory.
    pub fn progress_store(&self) -> ProgressStore {
        ProgressStore::in_dir(&self.confdir)
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.port == 0 {
            bail!("--port must be between 1 and 65535");
        }

        if args.increment == 0 || args.increment > MAX_INCREMENT {
            bail!(
                "--increment ({}) must be between 1 and {MAX_INCREMENT}",
                args.increment
            );
        }

        if args.instance > MAX_START {
            bail!(
                "--instance ({}) must be between 0 and {MAX_START}",
                args.instance
            );
        }

        if args.instance >= args.increment {
            bail!(
                "--instance ({}) must be less than --increment ({})",
                args.instance,
                args.increment
            );
        }

        debug_assert!(u64::from(args.instance) < TICK_OVER);

        let ip = args.ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        Ok(Self {
            listen_addr: SocketAddr::new(ip, args.port),
            start: u64::from(args.instance),
            increment: args.increment,
            confdir: args.confdir,
            verbose: args.verbose,
            log_json: args.log_json,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(
            core::iter::once("txnid-server").chain(args.iter().copied()),
        )?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn explicit_flags_are_applied() {
        let config = parse(&[
            "--ip",
            "127.0.0.1",
            "--port",
            "9000",
            "--instance",
            "2",
            "--increment",
            "5",
            "--confdir",
            "/tmp/txnid",
            "--verbose",
            "--shutdown-timeout",
            "7",
        ])
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.start, 2);
        assert_eq!(config.increment, 5);
        assert_eq!(config.confdir, PathBuf::from("/tmp/txnid"));
        assert!(config.verbose);
        assert!(!config.log_json);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(7));
        assert_eq!(
            config.progress_store().path(),
            PathBuf::from("/tmp/txnid/txnid.dat")
        );
    }

    #[test]
    fn unset_ip_listens_everywhere() {
        let config = parse(&["--port", "8963", "--increment", "1", "--instance", "0"]).unwrap();
        assert!(config.listen_addr.ip().is_unspecified());
        assert_eq!(config.listen_addr.port(), 8963);
    }

    #[test]
    fn instance_must_be_below_increment() {
        let err = parse(&["--instance", "3", "--increment", "3"]).unwrap_err();
        assert!(err.to_string().contains("must be less than --increment"));

        assert!(parse(&["--instance", "4", "--increment", "3"]).is_err());
        assert!(parse(&["--instance", "2", "--increment", "3"]).is_ok());
    }

    #[test]
    fn increment_is_bounded() {
        assert!(parse(&["--instance", "0", "--increment", "0"]).is_err());
        assert!(parse(&["--instance", "0", "--increment", "32768"]).is_err());
        assert!(parse(&["--instance", "0", "--increment", "32767"]).is_ok());
    }

    #[test]
    fn instance_is_bounded() {
        let err = parse(&["--instance", "32768", "--increment", "32767"]).unwrap_err();
        assert!(err.to_string().contains("--instance (32768)"));
    }

    #[test]
    fn zero_port_is_rejected() {
        assert!(parse(&["--port", "0", "--instance", "0", "--increment", "1"]).is_err());
    }

    #[test]
    fn non_numeric_values_fail_to_parse() {
        assert!(parse(&["--instance", "one"]).is_err());
        assert!(parse(&["--port", "70000"]).is_err());
        assert!(parse(&["--ip", "not-an-ip"]).is_err());
    }
}
