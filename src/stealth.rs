//! Hides the automation markers Chrome exposes under CDP control, so forms
//! that gate on `navigator.webdriver` behave as they would for the user.

use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page as CrPage;

use crate::error::{Error, Result};

/// Flag-only launch args. chromiumoxide adds the `--` prefix itself.
pub const KEY_ARGS: &[&str] = &[
    "disable-infobars",
    "disable-default-apps",
    "disable-component-update",
    "no-first-run",
];

/// `--key=value` launch args.
pub const KV_ARGS: &[(&str, &str)] = &[("disable-blink-features", "AutomationControlled")];

/// Register the evasion script so it runs before any site JS on every document.
pub async fn apply_stealth(page: &CrPage) -> Result<()> {
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
        .await
        .map_err(|e| Error::JsError(format!("Failed to inject stealth script: {e}")))?;
    Ok(())
}

static STEALTH_JS: &str = r#"
(() => {
  const define = (target, key, get) => {
    try { Object.defineProperty(target, key, { get, configurable: true, enumerable: true }); } catch (e) {}
  };

  define(Navigator.prototype, 'webdriver', () => false);

  if (!navigator.languages || navigator.languages.length === 0) {
    define(navigator, 'languages', () => ['en-US', 'en']);
  }

  if (!window.chrome) {
    window.chrome = { runtime: {}, loadTimes: () => ({}), csi: () => ({}) };
  }

  const query = window.Permissions && window.Permissions.prototype.query;
  if (query) {
    window.Permissions.prototype.query = function (parameters) {
      if (parameters && parameters.name === 'notifications') {
        return Promise.resolve({ state: Notification.permission });
      }
      return query.call(this, parameters);
    };
  }

  if (window.outerWidth === 0) define(window, 'outerWidth', () => window.innerWidth);
  if (window.outerHeight === 0) define(window, 'outerHeight', () => window.innerHeight + 85);
})();
"#;
