//! Page event types delivered by the page host.
//!
//! These types carry only what the tracker and optimizer read. Form
//! submissions arrive with their values, but only value lengths survive past
//! the tracker.

use serde::{Deserialize, Serialize};

/// Scroll geometry at the time of a scroll event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    /// Vertical scroll offset in pixels
    pub scroll_top: f64,
    /// Full document height in pixels
    pub scroll_height: f64,
    /// Viewport height in pixels
    pub viewport_height: f64,
}

impl ScrollPosition {
    pub fn new(scroll_top: f64, scroll_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_top,
            scroll_height,
            viewport_height,
        }
    }

    /// Scroll depth as a rounded percentage of the scrollable range.
    ///
    /// Returns `None` when the document does not scroll. Overscroll is
    /// clamped to 0..=100.
    pub fn percent(&self) -> Option<u32> {
        let range = self.scroll_height - self.viewport_height;
        if !(range > 0.0) || !self.scroll_top.is_finite() {
            return None;
        }
        let pct = (self.scroll_top / range * 100.0).round();
        Some(pct.clamp(0.0, 100.0) as u32)
    }
}

/// On-screen rectangle of an element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// The closest ancestor (or the target itself) carrying a tracking id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedElement {
    /// Lowercase tag name
    pub tag: String,
    /// Tracking id; used as the recorded event name
    pub tracking_id: String,
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Raw value attribute, parsed leniently when recorded
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub rect: ElementRect,
}

impl TrackedElement {
    /// Parse the value attribute the way a lenient float parser would:
    /// leading numeric prefix, or 0 when absent or unparseable.
    pub fn estimated_value(&self) -> f64 {
        self.value.as_deref().map(parse_float_prefix).unwrap_or(0.0)
    }
}

/// The element that received a click.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickTarget {
    /// Lowercase tag name
    pub tag: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ClickTarget {
    /// Anchor pointing at an absolute http(s) URL.
    pub fn is_external_link(&self) -> bool {
        self.tag == "a"
            && self
                .href
                .as_deref()
                .map(|h| h.starts_with("http"))
                .unwrap_or(false)
    }
}

/// A click anywhere on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub target: ClickTarget,
    #[serde(default)]
    pub tracked: Option<TrackedElement>,
    #[serde(default)]
    pub client_x: f64,
    #[serde(default)]
    pub client_y: f64,
}

impl ClickEvent {
    /// Tracking id of the enclosing tracked element, if any.
    pub fn tracking_id(&self) -> Option<&str> {
        self.tracked.as_ref().map(|t| t.tracking_id.as_str())
    }
}

/// Focus landing on a form control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldFocus {
    /// Lowercase tag name (input, textarea, select, ...)
    pub tag: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub form_id: Option<String>,
}

impl FieldFocus {
    pub fn is_form_control(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select")
    }

    pub fn is_text_entry(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea")
    }
}

/// A single submitted form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// A form submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    #[serde(default)]
    pub form_id: Option<String>,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

/// Unified event type for the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEvent {
    Scroll(ScrollPosition),
    /// The host's animation-frame callback; drains throttled scroll work
    AnimationFrame,
    Click(ClickEvent),
    Focus(FieldFocus),
    Submit(FormSubmission),
    VisibilityChange { hidden: bool },
    /// Pointer left the document; `client_y <= 0` means through the top edge
    PointerLeave { client_y: f64 },
    Unload,
}

/// Static facts about the page and device, stamped onto every recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSnapshot {
    pub url: String,
    pub referrer: String,
    pub user_agent: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            referrer: String::new(),
            user_agent: String::new(),
            screen_width: 0,
            screen_height: 0,
            viewport_width: 0,
            viewport_height: 0,
        }
    }
}

impl EnvironmentSnapshot {
    pub fn screen_resolution(&self) -> String {
        format!("{}x{}", self.screen_width, self.screen_height)
    }

    pub fn viewport_size(&self) -> String {
        format!("{}x{}", self.viewport_width, self.viewport_height)
    }

    /// Path component of the page URL, `/` when there is none.
    pub fn path(&self) -> String {
        let after_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(self.url.as_str());
        match after_scheme.find('/') {
            Some(i) => {
                let path = &after_scheme[i..];
                let end = path.find(|c: char| c == '?' || c == '#').unwrap_or(path.len());
                path[..end].to_string()
            }
            None => "/".to_string(),
        }
    }
}

/// Leading-float parse: "49.99 USD" -> 49.99, "abc" -> 0.
fn parse_float_prefix(raw: &str) -> f64 {
    let s = raw.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (i, c) in s.char_indices() {
        match c {
            '0'..='9' => {
                seen_digit = true;
                end = i + 1;
            }
            '.' if !seen_dot => {
                seen_dot = true;
            }
            '-' | '+' if i == 0 => {}
            _ => break,
        }
    }
    if !seen_digit {
        return 0.0;
    }
    s[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_percent() {
        assert_eq!(ScrollPosition::new(500.0, 2000.0, 1000.0).percent(), Some(50));
        assert_eq!(ScrollPosition::new(0.0, 2000.0, 1000.0).percent(), Some(0));
        assert_eq!(ScrollPosition::new(1100.0, 2000.0, 1000.0).percent(), Some(100));
        assert_eq!(ScrollPosition::new(10.0, 800.0, 1000.0).percent(), None);
    }

    #[test]
    fn test_estimated_value_parsing() {
        let mut tracked = TrackedElement {
            tag: "a".to_string(),
            tracking_id: "affiliate_click".to_string(),
            element_id: None,
            category: None,
            value: Some("49.99 USD".to_string()),
            rect: ElementRect::default(),
        };
        assert!((tracked.estimated_value() - 49.99).abs() < 1e-9);

        tracked.value = Some("n/a".to_string());
        assert_eq!(tracked.estimated_value(), 0.0);

        tracked.value = None;
        assert_eq!(tracked.estimated_value(), 0.0);
    }

    #[test]
    fn test_external_link_detection() {
        let link = ClickTarget {
            tag: "a".to_string(),
            href: Some("https://partner.example/watch".to_string()),
            text: None,
        };
        assert!(link.is_external_link());

        let relative = ClickTarget {
            tag: "a".to_string(),
            href: Some("/pricing".to_string()),
            text: None,
        };
        assert!(!relative.is_external_link());
    }

    #[test]
    fn test_environment_path() {
        let env = EnvironmentSnapshot {
            url: "https://club.example/offers/elite?ref=ad#top".to_string(),
            ..Default::default()
        };
        assert_eq!(env.path(), "/offers/elite");
        assert_eq!(env.screen_resolution(), "0x0");

        let bare = EnvironmentSnapshot {
            url: "https://club.example".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.path(), "/");
    }

    #[test]
    fn test_page_event_json_shape() {
        let event: PageEvent =
            serde_json::from_str(r#"{"type":"pointer_leave","client_y":-3.0}"#).unwrap();
        assert_eq!(event, PageEvent::PointerLeave { client_y: -3.0 });

        let scroll: PageEvent = serde_json::from_str(
            r#"{"type":"scroll","scroll_top":10,"scroll_height":100,"viewport_height":50}"#,
        )
        .unwrap();
        assert!(matches!(scroll, PageEvent::Scroll(_)));
    }
}
