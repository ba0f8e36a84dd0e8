use std::time::Duration;

use chromiumoxide::browser::{Browser as CrBrowser, BrowserConfig as CrBrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::{BrowserBuilder, BrowserConfig};
use crate::error::{Error, Result};
use crate::overlay;
use crate::page::Page;
use crate::stealth;

/// Chrome flags that improve performance without affecting functionality.
const PERF_ARGS: &[&str] = &[
    "disable-gpu",
    "disable-extensions",
    "metrics-recording-only",
    "mute-audio",
    "no-default-browser-check",
    "disable-client-side-phishing-detection",
    "disable-prompt-on-repost",
];

/// A launched Chrome instance that opens pages with the autofill panel installed.
pub struct AutofillBrowser {
    browser: CrBrowser,
    stealth: bool,
    default_timeout: Duration,
    _handler_task: tokio::task::JoinHandle<()>,
}

impl AutofillBrowser {
    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    /// Launch a browser instance with the given configuration.
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let mut builder = CrBrowserConfig::builder();

        if config.headless {
            builder = builder.new_headless_mode().no_sandbox();
        } else {
            builder = builder.with_head().no_sandbox();
        }

        for arg in PERF_ARGS {
            builder = builder.arg(*arg);
        }

        if config.stealth {
            for arg in stealth::KEY_ARGS {
                builder = builder.arg(*arg);
            }
            for arg in stealth::KV_ARGS {
                builder = builder.arg(*arg);
            }
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder = builder.viewport(Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: false,
            has_touch: false,
        });

        let cr_config = builder
            .build()
            .map_err(|e| Error::LaunchError(e.to_string()))?;

        let (browser, mut handler) = CrBrowser::launch(cr_config)
            .await
            .map_err(|e| Error::LaunchError(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        info!(
            headless = config.headless,
            stealth = config.stealth,
            "browser launched"
        );

        Ok(Self {
            browser,
            stealth: config.stealth,
            default_timeout: config.default_timeout,
            _handler_task: handler_task,
        })
    }

    /// Open a new tab at `url`. Stealth and the autofill panel are registered
    /// before navigation so both survive later page loads.
    pub async fn new_page(&self, url: &str) -> Result<Page> {
        let cr_page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?;

        let stealth_fut = async {
            if self.stealth {
                stealth::apply_stealth(&cr_page).await
            } else {
                Ok(())
            }
        };
        let (stealth_result, overlay_result) =
            tokio::join!(stealth_fut, overlay::register(&cr_page));
        stealth_result?;
        overlay_result?;

        cr_page
            .goto(url)
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?;
        debug!(url, "page opened");

        Ok(Page::new(cr_page, self.default_timeout))
    }
}
