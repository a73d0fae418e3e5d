//! Browser-session observer built on chromiumoxide (CDP).
//!
//! Launches (or attaches to) Chrome, opens the CRM login page for the
//! operator, and reports every network response with its request method and
//! body as a `NetworkEvent`. Pairing happens in `correlate`.

use serde::{Deserialize, Serialize};

#[cfg(feature = "browser")]
use std::time::Duration;

use anyhow::Result;
#[cfg(feature = "browser")]
use anyhow::Context;
#[cfg(feature = "browser")]
use async_trait::async_trait;
#[cfg(feature = "browser")]
use tokio::sync::mpsc;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived,
};
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig};
#[cfg(feature = "browser")]
use futures::{stream, StreamExt};

#[cfg(feature = "browser")]
use super::correlate::{correlate, Observed, RequestTracker};
#[cfg(feature = "browser")]
use super::{EventSource, NetworkEvent};

/// Browser session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Run without a window. The operator normally drives the UI, so this
    /// defaults to false.
    #[serde(default)]
    pub headless: bool,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// DevTools request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            remote_url: None,
            proxy: None,
            chrome_args: Vec::new(),
            timeout: default_timeout(),
        }
    }
}

/// Observes one browser page's network traffic.
#[cfg(feature = "browser")]
pub struct BrowserObserver {
    browser: Browser,
    handler_task: JoinHandle<()>,
    listener_task: JoinHandle<()>,
    events: mpsc::Receiver<NetworkEvent>,
}

#[cfg(feature = "browser")]
impl BrowserObserver {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found. Install it or set browser.remote_url \
             to an existing DevTools endpoint"
        ))
    }

    /// Launch or attach to Chrome, start observing, then open `login_url`.
    pub async fn start(settings: &BrowserSettings, login_url: &str) -> Result<Self> {
        let (browser, mut handler) = match settings.remote_url {
            Some(ref remote) => Self::connect_remote(remote, settings.timeout).await?,
            None => Self::launch(settings).await?,
        };

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser page")?;
        page.execute(EnableParams::default())
            .await
            .context("Failed to enable network events")?;

        let requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await?
            .map(|e| Observed::Request {
                id: e.request_id.inner().clone(),
                method: e.request.method.clone(),
                post_data: e.request.post_data.clone(),
            });
        let responses = page
            .event_listener::<EventResponseReceived>()
            .await?
            .map(|e| Observed::Response {
                id: e.request_id.inner().clone(),
                url: e.response.url.clone(),
                status: u16::try_from(e.response.status).unwrap_or(0),
            });
        let failures = page
            .event_listener::<EventLoadingFailed>()
            .await?
            .map(|e| Observed::Failed {
                id: e.request_id.inner().clone(),
            });
        let observed = Box::pin(stream::select(requests, stream::select(responses, failures)));

        let (tx, events) = mpsc::channel(256);
        let listener_task = tokio::spawn(correlate(observed, RequestTracker::default(), tx));

        info!("Opening {}", login_url);
        page.goto(login_url)
            .await
            .with_context(|| format!("Failed to open {}", login_url))?;

        Ok(Self {
            browser,
            handler_task,
            listener_task,
            events,
        })
    }

    async fn launch(
        settings: &BrowserSettings,
    ) -> Result<(Browser, chromiumoxide::handler::Handler)> {
        info!("Launching browser (headless={})", settings.headless);
        let chrome_path = Self::find_chrome()?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(Duration::from_secs(settings.timeout));

        // with_head means NOT headless
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = settings.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        for arg in &settings.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        Browser::launch(config)
            .await
            .context("Failed to launch browser")
    }

    async fn connect_remote(
        url: &str,
        timeout: u64,
    ) -> Result<(Browser, chromiumoxide::handler::Handler)> {
        info!("Connecting to remote browser at {}", url);

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(timeout),
            ..Default::default()
        };

        Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("Failed to connect to remote browser")
    }

    /// Stop observing and close the browser.
    pub async fn close(mut self) {
        self.listener_task.abort();
        if let Err(e) = self.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        self.handler_task.abort();
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl EventSource for BrowserObserver {
    async fn next_event(&mut self) -> Option<NetworkEvent> {
        self.events.recv().await
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserObserver;

#[cfg(not(feature = "browser"))]
impl BrowserObserver {
    pub async fn start(_settings: &BrowserSettings, _login_url: &str) -> Result<Self> {
        Err(anyhow::anyhow!(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
        ))
    }

    pub async fn close(self) {}
}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl super::EventSource for BrowserObserver {
    async fn next_event(&mut self) -> Option<super::NetworkEvent> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_settings_defaults() {
        let settings: BrowserSettings = serde_json::from_str("{}").unwrap();
        assert!(!settings.headless);
        assert_eq!(settings.timeout, 30);
        assert_eq!(settings, BrowserSettings::default());
    }
}
