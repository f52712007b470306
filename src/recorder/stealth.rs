// SPDX-License-Identifier: MIT
//! Init scripts that mask the usual automation fingerprints.
//!
//! Evasion configuration, not a security boundary: detection techniques
//! evolve and these overrides may go stale without breaking anything else.

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;

/// Scripts injected before any page script runs.
const STEALTH_SCRIPTS: &[&str] = &[
    // Mask the webdriver property.
    r#"Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined
    });"#,
    // Mock languages and plugins to look real.
    r#"Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en']
    });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [1, 2, 3, 4, 5]
    });"#,
    // Mask Chrome-specific automation variables.
    r#"window.chrome = { runtime: {} };
    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications' ?
        Promise.resolve({ state: Notification.permission }) :
        originalQuery(parameters)
    );"#,
];

/// Register every stealth script on the page.
pub async fn apply(page: &Page) -> Result<()> {
    for source in STEALTH_SCRIPTS {
        let params = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(*source)
            .build()
            .map_err(|e| anyhow::anyhow!(e))
            .context("failed to build stealth init script")?;
        page.execute(params)
            .await
            .context("failed to register stealth init script")?;
    }
    Ok(())
}
