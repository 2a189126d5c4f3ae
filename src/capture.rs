//! Live page capture through a stealth Chrome session.
//!
//! The browser does the part only it can do (layout, computed style, shadow
//! roots); everything after that runs on the captured [`DocumentSnapshot`].

use chrono::Utc;
use eoka::{Browser, Page};
use locator_core::dom::{DocumentSnapshot, VENDOR_SHADOW_SLOTS};
use locator_core::Document;
use tracing::{debug, info};

use crate::config::BrowserConfig;
use crate::Result;

/// Serializes the whole document, shadow trees included. `__SLOTS__` is
/// replaced with the vendor slot names as a JSON array.
const CAPTURE_JS: &str = r#"
(() => {
    const SLOTS = __SLOTS__;
    const MAX_INNER_TEXT = 500;

    function rootOf(el) {
        let root = el.shadowRoot || null;
        const stashed = [];
        for (const slot of SLOTS) {
            let value;
            try { value = el[slot]; } catch (e) { continue; }
            if (!(value instanceof ShadowRoot)) continue;
            if (!root) root = value;
            if (value === root) stashed.push(slot);
        }
        return { root, stashed };
    }

    function element(el) {
        const out = {
            type: 'element',
            tag: el.tagName.toLowerCase(),
            attributes: Array.from(el.attributes, a => [a.name, a.value]),
            style: null,
            rect: null,
            children: [],
        };
        try {
            const s = getComputedStyle(el);
            out.style = {
                display: s.display,
                visibility: s.visibility,
                opacity: parseFloat(s.opacity),
            };
        } catch (e) {}
        try {
            const r = el.getBoundingClientRect();
            out.rect = { x: r.x, y: r.y, width: r.width, height: r.height };
        } catch (e) {}
        if (typeof el.innerText === 'string' && (el.textContent || '').length <= MAX_INNER_TEXT) {
            out.innerText = el.innerText;
        }
        out.children = nodes(el.childNodes);

        const { root, stashed } = rootOf(el);
        if (root) {
            out.shadowRoot = { mode: root.mode, children: nodes(root.childNodes) };
            if (stashed.length) out.stashedSlots = stashed;
        }
        return out;
    }

    function nodes(list) {
        const out = [];
        for (const n of list) {
            if (n.nodeType === Node.ELEMENT_NODE) out.push(element(n));
            else if (n.nodeType === Node.TEXT_NODE) out.push({ type: 'text', data: n.data });
            else if (n.nodeType === Node.COMMENT_NODE) out.push({ type: 'comment', data: n.data });
        }
        return out;
    }

    return JSON.stringify({
        url: location.href,
        title: document.title,
        viewport: {
            width: window.innerWidth,
            height: window.innerHeight,
            scrollX: window.scrollX,
            scrollY: window.scrollY,
        },
        children: nodes(document.childNodes),
    });
})()
"#;

/// An open browser with one page.
pub struct Capture {
    browser: Browser,
    page: Page,
    settle_ms: u64,
}

impl Capture {
    /// Launch a browser with the given config.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            settle_ms: config.settle_ms,
        })
    }

    /// The underlying page.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate to `url`, let it settle, and snapshot it.
    pub async fn snapshot(&self, url: &str) -> Result<DocumentSnapshot> {
        debug!("goto: {}", url);
        self.page.goto(url).await?;
        if self.settle_ms > 0 {
            self.page.wait(self.settle_ms).await;
        }
        self.snapshot_current().await
    }

    /// Snapshot whatever the page currently shows.
    pub async fn snapshot_current(&self) -> Result<DocumentSnapshot> {
        let slots = serde_json::to_string(VENDOR_SHADOW_SLOTS)?;
        let js = CAPTURE_JS.replace("__SLOTS__", &slots);
        let json_str: String = self.page.evaluate(&js).await?;

        let mut snapshot: DocumentSnapshot = serde_json::from_str(&json_str)
            .map_err(|e| eoka::Error::CdpSimple(format!("capture parse error: {}", e)))?;
        snapshot.captured_at = Some(Utc::now());
        info!(
            url = snapshot.url.as_deref().unwrap_or(""),
            bytes = json_str.len(),
            "captured page"
        );
        Ok(snapshot)
    }

    /// Navigate to `url` and load it as a [`Document`].
    pub async fn document(&self, url: &str) -> Result<Document> {
        let snapshot = self.snapshot(url).await?;
        Ok(Document::from_snapshot(&snapshot))
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}
