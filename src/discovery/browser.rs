//! Chromium-backed request observer.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::discovery::{is_season_request, CaptureTarget, RequestObserver};

/// Launch flags needed inside containers without a GPU or user namespaces.
const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
];

pub struct ChromiumObserver {
    headless: bool,
}

impl ChromiumObserver {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }

    fn browser_config(&self, target: &CaptureTarget) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .args(LAUNCH_ARGS.iter().copied())
            .request_timeout(target.navigation_timeout);
        if !self.headless {
            builder = builder.with_head();
        }
        builder
            .build()
            .map_err(|e| anyhow!("Invalid browser config: {e}"))
    }
}

#[async_trait]
impl RequestObserver for ChromiumObserver {
    async fn capture(&self, target: &CaptureTarget) -> Result<Vec<String>> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config(target)?)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = run_session(&browser, target).await;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "Failed to close browser cleanly");
        }
        let _ = browser.wait().await;
        handler_task.abort();

        result
    }
}

async fn run_session(browser: &Browser, target: &CaptureTarget) -> Result<Vec<String>> {
    let page = browser
        .new_page("about:blank")
        .await
        .context("Failed to open page")?;

    // Installed before navigation so requests fired during page load are seen.
    let mut requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .context("Failed to install request listener")?;

    info!(url = %target.landing_url, "Navigating to landing page");
    timeout(target.navigation_timeout, page.goto(target.landing_url.as_str()))
        .await
        .context("Navigation timed out")?
        .context("Navigation failed")?;

    match click_link(&page, &target.league_link_text, target.selector_timeout).await {
        Ok(()) => info!(link = %target.league_link_text, "Clicked league link"),
        Err(e) => warn!(link = %target.league_link_text, error = %e, "League link not clicked, listening anyway"),
    }

    info!(seconds = target.listen.as_secs(), "Listening for season requests");
    let deadline = Instant::now() + target.listen;
    let mut captured = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, requests.next()).await {
            Ok(Some(event)) => {
                let url = &event.request.url;
                if is_season_request(url) {
                    debug!(url = %url, "Captured season request");
                    captured.push(url.clone());
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    Ok(captured)
}

/// Wait for an anchor whose text contains `text` and click it.
async fn click_link(page: &Page, text: &str, wait: Duration) -> Result<()> {
    let xpath = format!("//a[contains(normalize-space(.), {})]", xpath_literal(text));
    let deadline = Instant::now() + wait;

    loop {
        match page.find_xpath(xpath.as_str()).await {
            Ok(element) => {
                element.click().await.context("Click failed")?;
                return Ok(());
            }
            Err(e) if Instant::now() >= deadline => {
                return Err(anyhow!("link not found within {wait:?}: {e}"));
            }
            Err(_) => sleep(Duration::from_millis(250)).await,
        }
    }
}

fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
