use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{info, warn};

/// How the HTTP client should treat proxies for one endpoint.
enum ProxyResolution {
    UseProxy(String),
    /// `proxy = ""` in config: bypass proxies, including env vars.
    ForceDirectConnect,
    /// Not configured; reqwest reads HTTPS_PROXY/HTTP_PROXY itself.
    None,
}

fn is_loopback(api_base: &str) -> bool {
    let without_scheme = api_base
        .find("://")
        .map(|pos| &api_base[pos + 3..])
        .unwrap_or(api_base);
    let host = without_scheme
        .split('/')
        .next()
        .and_then(|h| h.split(':').next())
        .unwrap_or("");
    matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0")
}

fn resolve_proxy(proxy: Option<&str>, api_base: &str) -> ProxyResolution {
    match proxy {
        Some("") => ProxyResolution::ForceDirectConnect,
        Some(p) => ProxyResolution::UseProxy(p.to_string()),
        // A local model server must never be reached through a corporate proxy.
        None if is_loopback(api_base) => ProxyResolution::ForceDirectConnect,
        None => ProxyResolution::None,
    }
}

/// Build the reqwest client used for model calls.
pub fn build_http_client(proxy: Option<&str>, api_base: &str, timeout: Duration) -> Client {
    let mut builder = Client::builder().timeout(timeout);

    match resolve_proxy(proxy, api_base) {
        ProxyResolution::UseProxy(proxy_url) => match Proxy::all(&proxy_url) {
            Ok(p) => {
                info!(proxy = %proxy_url, api_base = %api_base, "Model provider using proxy");
                builder = builder.proxy(p);
            }
            Err(e) => {
                warn!(error = %e, proxy = %proxy_url, "Invalid proxy URL, falling back to direct connect");
            }
        },
        ProxyResolution::ForceDirectConnect => {
            builder = builder.no_proxy();
        }
        ProxyResolution::None => {}
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client, using default");
        Client::new()
    })
}
