use crate::error::RouteError;
use crate::proxy::handler::{Handler, HandlerFuture};
use crate::utils::http::text_response;
use crate::utils::radix::RadixTree;
use hyper::{Body, Request, StatusCode};
use log::{debug, info, warn};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Routing table keyed by exact request path, mutable while requests are in flight.
///
/// Lookups take the read lock only long enough to clone the handler out, so a slow backend never
/// blocks registration.
#[derive(Debug, Default)]
pub struct ProxyMux {
    routes: RwLock<RadixTree<Arc<dyn Handler>>>,
}

impl ProxyMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, path: &str, handler: Arc<dyn Handler>) -> Result<(), RouteError> {
        let inserted = self.routes.write().await.insert(path, handler);
        match inserted {
            Ok(()) => {
                info!("Registered route {}", path);
                Ok(())
            }
            Err(_) => {
                warn!("Refusing to register {}: route already exists", path);
                Err(RouteError::Duplicate(path.to_string()))
            }
        }
    }

    /// Removing a path that is not registered is not an error.
    pub async fn remove(&self, path: &str) {
        let removed = self.routes.write().await.remove(path);
        if removed.is_some() {
            info!("Unregistered route {}", path);
        } else {
            debug!("No route registered for {}, nothing to remove", path);
        }
    }

    pub async fn get(&self, path: &str) -> Option<Arc<dyn Handler>> {
        self.routes.read().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.routes.read().await.is_empty()
    }
}

impl Handler for ProxyMux {
    fn serve(&self, client_ip: IpAddr, req: Request<Body>) -> HandlerFuture<'_> {
        Box::pin(async move {
            let path = req.uri().path().to_string();
            match self.get(&path).await {
                Some(handler) => handler.serve(client_ip, req).await,
                None => {
                    warn!("No handler registered for {path} (from {ip})", path = path, ip = client_ip);
                    Ok(text_response(StatusCode::INTERNAL_SERVER_ERROR, format!("no handler registered for path {}", path)))
                }
            }
        })
    }
}
