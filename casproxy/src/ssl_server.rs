use crate::proxy::handler::Handler;
use crate::proxy::http_server::{respond, shutdown_signal};
use anyhow::{Context, Result, anyhow};
use hyper::service::service_fn;
use log::{debug, error, info, warn};
use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::TcpListenerStream;

/// Build a rustls server config from a PEM certificate chain and a PEM private key.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig> {
    let cert_file = File::open(cert_path).with_context(|| format!("failed to open SSL certificate {}", cert_path.display()))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .with_context(|| format!("failed to parse SSL certificate {}", cert_path.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {}", cert_path.display()));
    }

    let key_file = File::open(key_path).with_context(|| format!("failed to open SSL key {}", key_path.display()))?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .with_context(|| format!("failed to parse SSL key {}", key_path.display()))?
        .ok_or_else(|| anyhow!("no private key found in {}", key_path.display()))?;

    let mut config = ServerConfig::builder().with_no_client_auth().with_single_cert(certs, key).context("invalid SSL certificate or key")?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

/// HTTPS listener terminating TLS with the given certificate. Connections are served over
/// HTTP/1.1 with upgrades enabled so websocket tunnels work behind TLS.
pub async fn serve_tls(addr: SocketAddr, cert_path: &Path, key_path: &Path, handler: Arc<dyn Handler>) -> Result<()> {
    let acceptor = TlsAcceptor::from(Arc::new(load_tls_config(cert_path, key_path)?));
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {}", addr))?;
    let mut incoming = TcpListenerStream::new(listener);
    info!("HTTPS server running on {}", addr);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let stream = tokio::select! {
            _ = &mut shutdown => break,
            next = incoming.next() => match next {
                Some(Ok(stream)) => stream,
                Some(Err(e)) => {
                    warn!("TCP accept error on {}: {}", addr, e);
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    continue;
                }
                None => {
                    warn!("TCP incoming stream on {} ended", addr);
                    break;
                }
            },
        };

        let client_ip = match stream.peer_addr() {
            Ok(peer) => peer.ip(),
            Err(e) => {
                debug!("Dropping connection without a peer address: {}", e);
                continue;
            }
        };
        let acceptor = acceptor.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            let tls = match acceptor.accept(stream).await {
                Ok(tls) => tls,
                Err(e) => {
                    debug!("TLS handshake with {} failed: {}", client_ip, e);
                    return;
                }
            };
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(respond(handler.as_ref(), client_ip, req).await) }
            });
            let mut http = hyper::server::conn::Http::new();
            http.http1_only(true);
            http.http1_keep_alive(true);
            if let Err(e) = http.serve_connection(tls, service).with_upgrades().await {
                error!("HTTPS connection error from {}: {}", client_ip, e);
            }
        });
    }

    info!("HTTPS server on {} stopped", addr);
    Ok(())
}
