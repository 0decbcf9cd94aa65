//! Chrome process management.
//!
//! Launches a local Chrome/Chromium with remote debugging enabled and
//! discovers the WebSocket URL of its first page target.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// A running browser process. Killed when dropped.
pub struct BrowserProcess {
    child: Child,
    pub debug_port: u16,
    pub user_data_dir: PathBuf,
    pub headed: bool,
}

impl BrowserProcess {
    pub async fn launch(
        browser_path: Option<&str>,
        user_data_dir: &Path,
        headed: bool,
    ) -> Result<Self, String> {
        let binary = match browser_path {
            Some(p) => p.to_string(),
            None => find_browser_binary()
                .ok_or_else(|| "Chrome/Chromium not found. Please install it.".to_string())?,
        };

        std::fs::create_dir_all(user_data_dir)
            .map_err(|e| format!("Failed to create user data dir: {}", e))?;

        let debug_port = find_free_port().await?;
        let args = build_browser_args(debug_port, user_data_dir, headed);

        info!(port = debug_port, headed = headed, binary = %binary, "Launching browser");

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to launch {}: {}", binary, e))?;

        let process = Self {
            child,
            debug_port,
            user_data_dir: user_data_dir.to_path_buf(),
            headed,
        };
        wait_for_cdp_ready(debug_port, 15).await?;
        Ok(process)
    }

    /// WebSocket URL of an open tab, opening a blank one if the user closed them all.
    pub async fn page_ws_url(&self) -> Result<String, String> {
        match get_page_ws_url(self.debug_port).await {
            Ok(url) => Ok(url),
            Err(e) => {
                debug!(error = %e, "No page target, opening a new tab");
                open_new_tab(self.debug_port).await
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("Browser kill failed (may already be gone): {}", e);
        }
    }
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

fn build_browser_args(debug_port: u16, user_data_dir: &Path, headed: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--password-store=basic".to_string(),
    ];
    if !headed {
        args.push("--headless=new".to_string());
    }
    args.push("--window-size=1280,900".to_string());
    args.push("about:blank".to_string());
    args
}

pub fn find_browser_binary() -> Option<String> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome", "google-chrome-stable",
            "chromium", "chromium-browser",
            "/usr/bin/google-chrome", "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

async fn find_free_port() -> Result<u16, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("Failed to bind to find free port: {}", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local addr: {}", e))?
        .port();
    drop(listener);
    Ok(port)
}

/// Polls /json/version until Chrome answers, up to `timeout_secs`.
async fn wait_for_cdp_ready(port: u16, timeout_secs: u64) -> Result<(), String> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(format!(
                "Chrome CDP not ready after {}s on port {}",
                timeout_secs, port
            ));
        }
        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if body.get("webSocketDebuggerUrl").is_some() {
                    return Ok(());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn first_page_ws_url(targets: &[Value]) -> Option<String> {
    targets
        .iter()
        .filter(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
        .find_map(|t| t.get("webSocketDebuggerUrl").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

/// The page target may not be listed immediately after launch; retry briefly.
async fn get_page_ws_url(port: u16) -> Result<String, String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };
        if let Some(ws_url) = first_page_ws_url(&targets) {
            return Ok(ws_url);
        }
    }

    Err("No page target found after retries".to_string())
}

async fn open_new_tab(port: u16) -> Result<String, String> {
    let url = format!("http://127.0.0.1:{}/json/new?about:blank", port);
    let target: Value = reqwest::Client::new()
        .put(&url)
        .send()
        .await
        .map_err(|e| format!("Failed to open new tab: {}", e))?
        .json()
        .await
        .map_err(|e| format!("Unexpected /json/new response: {}", e))?;
    target
        .get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| "New tab has no WebSocket URL".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headless_flag_only_when_not_headed() {
        let dir = PathBuf::from("/tmp/profile");
        let headed = build_browser_args(9222, &dir, true);
        let headless = build_browser_args(9222, &dir, false);
        assert!(!headed.iter().any(|a| a.starts_with("--headless")));
        assert!(headless.contains(&"--headless=new".to_string()));
        assert!(headed.contains(&"--remote-debugging-port=9222".to_string()));
        assert!(headed.contains(&"--user-data-dir=/tmp/profile".to_string()));
    }

    #[test]
    fn test_first_page_ws_url_skips_workers() {
        let targets = vec![
            json!({"type": "service_worker", "webSocketDebuggerUrl": "ws://w"}),
            json!({"type": "page", "webSocketDebuggerUrl": "ws://p"}),
        ];
        assert_eq!(first_page_ws_url(&targets).as_deref(), Some("ws://p"));
        assert_eq!(first_page_ws_url(&[]), None);
    }

    #[tokio::test]
    async fn test_find_free_port() {
        let port = find_free_port().await.unwrap();
        assert!(port > 0);
    }
}
