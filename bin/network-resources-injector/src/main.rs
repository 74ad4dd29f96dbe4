use anyhow::{Context, Result};
use clap::Parser;
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::tokio::TokioIo;
use injector_core::{KubeNetworkLookup, NetworkResolver, PatchEngine};
use injector_webhook::{AdmissionMetrics, TlsServerConfig, WebhookHandler, MUTATE_PATH};
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{Config, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);
    config.validate()?;

    info!("Starting network-resources-injector...");

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Kubernetes client initialized");

    let resolver = NetworkResolver::new(Arc::new(KubeNetworkLookup::new(client)))
        .with_timeout(config.lookup_timeout());
    let lookup_timeout = resolver.timeout();
    let engine = PatchEngine::new(resolver).with_policy(config.merge_policy);
    info!(
        "Patch engine initialized (merge policy: {}, lookup timeout: {:?})",
        engine.policy(),
        lookup_timeout
    );

    let metrics = AdmissionMetrics::new().context("Failed to create metrics")?;
    let policy = config.admission_policy();
    info!(
        "Failure policy: malformed annotation={}, resolution error={}",
        policy.on_malformed_input, policy.on_resolution_error
    );
    let handler = Arc::new(WebhookHandler::new(engine, policy, metrics));

    let tls_acceptor = match (&config.tls_cert_file, &config.tls_key_file) {
        (Some(cert), Some(key)) => {
            let tls = TlsServerConfig::from_files(cert, key)?;
            Some(TlsAcceptor::from(tls.config))
        }
        _ => {
            warn!("TLS not configured - serving plain HTTP because --insecure is set");
            None
        }
    };

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "Listening on {} ({}), admission path {}",
        addr,
        if tls_acceptor.is_some() { "https" } else { "http" },
        MUTATE_PATH
    );

    tokio::select! {
        result = accept_connections(listener, handler, tls_acceptor) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping");
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Accept connections, one task per connection
async fn accept_connections(
    listener: TcpListener,
    handler: Arc<WebhookHandler>,
    tls_acceptor: Option<TlsAcceptor>,
) -> Result<()> {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Error accepting connection: {}", e);
                continue;
            }
        };

        let handler = handler.clone();
        let tls_acceptor = tls_acceptor.clone();

        tokio::task::spawn(async move {
            match tls_acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve(tls_stream, peer_addr, handler).await,
                    Err(e) => debug!("TLS error from {}: {}", peer_addr, e),
                },
                None => serve(stream, peer_addr, handler).await,
            }
        });
    }
}

async fn serve<S>(stream: S, peer_addr: SocketAddr, handler: Arc<WebhookHandler>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let handler = handler.clone();
        async move { handler.handle(req).await }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        debug!("Error serving connection from {}: {}", peer_addr, e);
    }
}
