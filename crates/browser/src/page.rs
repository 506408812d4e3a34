//! `PageDriver` implementation over a CDP-attached tab.
//!
//! Elements are handed to the agent as opaque handles. Each scan stamps
//! matched elements with a `data-deskbot-ref` attribute; later calls
//! address elements by that attribute, so a handle stays valid exactly
//! as long as the element stays in the document.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use deskbot_core::{Error, Result};
use deskbot_page::{Control, Dialog, DialogButton, PageDriver};

use crate::cdp::CdpClient;

const CONTAINER_SELECTOR: &str =
    "[class*=\"day\"], [class*=\"card\"], [class*=\"cell\"], li, td, article, section, div";

const DIALOG_SELECTOR: &str =
    "[role=\"dialog\"], [aria-modal=\"true\"], [class*=\"modal\" i], [class*=\"dialog\" i]";

const CLICKABLE_SELECTOR: &str =
    "button, a, [role=\"button\"], input[type=\"button\"], input[type=\"submit\"]";

pub struct CdpPage {
    client: Arc<CdpClient>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlRecord {
    r#ref: String,
    text: String,
    enabled: bool,
    #[serde(default)]
    container_text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ButtonRecord {
    r#ref: String,
    text: String,
    enabled: bool,
}

#[derive(Deserialize)]
struct DialogRecord {
    buttons: Vec<ButtonRecord>,
}

impl CdpPage {
    pub fn new(client: Arc<CdpClient>) -> Self {
        Self { client }
    }

    /// Shared in-page helpers: handle stamping, visibility and enabled
    /// checks, container text lookup.
    fn prelude() -> String {
        format!(
            r#"
            const tagRef = (el) => {{
                if (!el.dataset.deskbotRef) {{
                    window.__deskbotSeq = (window.__deskbotSeq || 0) + 1;
                    el.dataset.deskbotRef = 'db-' + window.__deskbotSeq;
                }}
                return el.dataset.deskbotRef;
            }};
            const isVisible = (el) => {{
                const rect = el.getBoundingClientRect();
                return rect.width > 0 && rect.height > 0;
            }};
            const isEnabled = (el) =>
                !el.disabled && el.getAttribute('aria-disabled') !== 'true';
            const elText = (el) =>
                ((el.innerText || el.value || '') + '').trim();
            const containerText = (el) => {{
                const box = el.closest('{CONTAINER_SELECTOR}');
                return box ? (box.innerText || '').trim() : '';
            }};
            const byRef = (ref) =>
                document.querySelector('[data-deskbot-ref="' + ref + '"]');
            "#
        )
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, body: &str) -> Result<T> {
        let expression = format!(
            "JSON.stringify((() => {{ {} {} }})())",
            Self::prelude(),
            body
        );
        let value = self.client.evaluate(&expression).await?;
        let json = value
            .as_str()
            .ok_or_else(|| Error::Browser("page script returned no JSON".into()))?;
        serde_json::from_str(json)
            .map_err(|e| Error::Browser(format!("unexpected page script result: {e}")))
    }

    fn handle_literal(handle: &str) -> Result<String> {
        serde_json::to_string(handle)
            .map_err(|e| Error::Browser(format!("bad element handle: {e}")))
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn current_url(&self) -> Result<String> {
        let value = self.client.evaluate("window.location.href").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Browser("window.location.href returned no string".into()))
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.client.navigate(url).await
    }

    async fn scan_controls(&self) -> Result<Vec<Control>> {
        let body = format!(
            r#"
            const out = [];
            for (const el of document.querySelectorAll('{CLICKABLE_SELECTOR}')) {{
                if (!isVisible(el)) continue;
                out.push({{
                    ref: tagRef(el),
                    text: elText(el),
                    enabled: isEnabled(el),
                    containerText: containerText(el),
                }});
            }}
            return out;
            "#
        );
        let records: Vec<ControlRecord> = self.eval(&body).await?;
        Ok(records
            .into_iter()
            .map(|r| Control {
                handle: r.r#ref,
                text: r.text,
                enabled: r.enabled,
                container_text: r.container_text,
            })
            .collect())
    }

    async fn refresh_control(&self, handle: &str) -> Result<Option<Control>> {
        let literal = Self::handle_literal(handle)?;
        let body = format!(
            r#"
            const el = byRef({literal});
            if (!el || !el.isConnected) return null;
            return {{
                ref: el.dataset.deskbotRef,
                text: elText(el),
                enabled: isEnabled(el),
                containerText: containerText(el),
            }};
            "#
        );
        let record: Option<ControlRecord> = self.eval(&body).await?;
        Ok(record.map(|r| Control {
            handle: r.r#ref,
            text: r.text,
            enabled: r.enabled,
            container_text: r.container_text,
        }))
    }

    async fn scroll_into_view(&self, handle: &str) -> Result<()> {
        let literal = Self::handle_literal(handle)?;
        let body = format!(
            r#"
            const el = byRef({literal});
            if (el) el.scrollIntoView({{ block: 'center', behavior: 'instant' }});
            return null;
            "#
        );
        let _: Option<()> = self.eval(&body).await?;
        Ok(())
    }

    async fn click(&self, handle: &str) -> Result<()> {
        let literal = Self::handle_literal(handle)?;
        let body = format!(
            r#"
            const el = byRef({literal});
            if (!el) return false;
            el.click();
            return true;
            "#
        );
        let clicked: bool = self.eval(&body).await?;
        if clicked {
            Ok(())
        } else {
            Err(Error::Agent(format!("element {handle} is gone, cannot click")))
        }
    }

    async fn find_dialog(&self) -> Result<Option<Dialog>> {
        let body = format!(
            r#"
            let dialog = null;
            for (const el of document.querySelectorAll('{DIALOG_SELECTOR}')) {{
                if (isVisible(el)) {{ dialog = el; break; }}
            }}
            if (!dialog) return null;
            const buttons = [];
            for (const btn of dialog.querySelectorAll('{CLICKABLE_SELECTOR}')) {{
                if (!isVisible(btn)) continue;
                buttons.push({{
                    ref: tagRef(btn),
                    text: elText(btn),
                    enabled: isEnabled(btn),
                }});
            }}
            return {{ buttons }};
            "#
        );
        let record: Option<DialogRecord> = self.eval(&body).await?;
        Ok(record.map(|d| Dialog {
            buttons: d
                .buttons
                .into_iter()
                .map(|b| DialogButton {
                    handle: b.r#ref,
                    text: b.text,
                    enabled: b.enabled,
                })
                .collect(),
        }))
    }

    async fn click_dialog_button(&self, handle: &str) -> Result<()> {
        self.click(handle).await
    }

    async fn container_text(&self, handle: &str) -> Result<String> {
        let literal = Self::handle_literal(handle)?;
        let body = format!(
            r#"
            const el = byRef({literal});
            return el ? containerText(el) : '';
            "#
        );
        self.eval(&body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_escaped_as_js_strings() {
        let literal = CdpPage::handle_literal("db-12").unwrap();
        assert_eq!(literal, "\"db-12\"");

        let hostile = CdpPage::handle_literal("\"]'); alert(1); ('").unwrap();
        assert!(hostile.starts_with('"') && hostile.ends_with('"'));
        assert!(hostile.contains("\\\""));
    }

    #[test]
    fn control_records_deserialize_from_page_json() {
        let json = r#"[{"ref":"db-1","text":"Book desk","enabled":true,"containerText":"Monday, March 2"}]"#;
        let records: Vec<ControlRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].r#ref, "db-1");
        assert!(records[0].enabled);
        assert_eq!(records[0].container_text, "Monday, March 2");
    }

    #[test]
    fn dialog_record_tolerates_empty_buttons() {
        let dialog: DialogRecord = serde_json::from_str(r#"{"buttons":[]}"#).unwrap();
        assert!(dialog.buttons.is_empty());
    }
}
