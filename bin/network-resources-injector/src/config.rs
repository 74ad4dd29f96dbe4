use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use injector_core::MergePolicy;
use injector_webhook::{AdmissionPolicy, FailurePolicy};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Mutating admission webhook adding network device resources to pods
#[derive(Parser, Debug, Clone)]
#[command(name = "network-resources-injector", version, about)]
pub struct Config {
    #[arg(long, env = "INJECTOR_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    #[arg(long, env = "INJECTOR_PORT", default_value_t = 8443)]
    pub port: u16,

    #[arg(
        long,
        env = "INJECTOR_TLS_CERT",
        value_hint = clap::ValueHint::FilePath,
        help = "PEM certificate chain served to the API server"
    )]
    pub tls_cert_file: Option<PathBuf>,

    #[arg(
        long,
        env = "INJECTOR_TLS_KEY",
        value_hint = clap::ValueHint::FilePath,
        help = "PEM private key matching --tls-cert-file"
    )]
    pub tls_key_file: Option<PathBuf>,

    #[arg(long, help = "Serve plain HTTP, for local testing only")]
    pub insecure: bool,

    #[arg(
        long,
        default_value_t = 5000,
        help = "Upper bound on a single NetworkAttachmentDefinition lookup"
    )]
    pub lookup_timeout_ms: u64,

    #[arg(long, default_value_t = MergePolicy::Replace, help = "replace or accumulate")]
    pub merge_policy: MergePolicy,

    #[arg(long, default_value_t = FailurePolicy::Fail, help = "fail or ignore")]
    pub on_malformed_annotation: FailurePolicy,

    #[arg(long, default_value_t = FailurePolicy::Fail, help = "fail or ignore")]
    pub on_resolution_error: FailurePolicy,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// Reject flag combinations clap cannot express
    pub fn validate(&self) -> Result<()> {
        match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(_), Some(_)) => {}
            (None, None) if self.insecure => {}
            (None, None) => bail!("--tls-cert-file and --tls-key-file are required unless --insecure is set"),
            _ => bail!("--tls-cert-file and --tls-key-file must be given together"),
        }
        if self.lookup_timeout_ms == 0 {
            bail!("--lookup-timeout-ms must be greater than zero");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            on_malformed_input: self.on_malformed_annotation,
            on_resolution_error: self.on_resolution_error,
        }
    }
}
