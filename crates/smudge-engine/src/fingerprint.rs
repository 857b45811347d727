//! Device fingerprint snapshot.
//!
//! The rendering layer runs the probes (canvas render, WebGL debug info,
//! screen and navigator reads) and reports their raw results in a
//! [`FingerprintProbe`]; [`FingerprintProbe::capture`] reduces them to an
//! immutable [`Fingerprint`] once per widget instance.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use smudge_common::constants::sentinels::{CANVAS_ERROR, UNKNOWN, WEBGL_ERROR, WEBGL_NOT_SUPPORTED};
use smudge_common::{BrowserInfo, Fingerprint, ScreenInfo};

/// Outcome of the WebGL probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebGlProbe {
    /// No WebGL context could be created
    #[default]
    Unsupported,
    /// The probe threw
    Error,
    /// Context available; debug extension may hide vendor/renderer
    Available {
        vendor: Option<String>,
        renderer: Option<String>,
    },
}

/// Raw probe results from the rendering layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintProbe {
    /// Data URL of the reference canvas render; `None` if the render failed
    pub canvas_data_url: Option<String>,
    #[serde(default)]
    pub webgl: WebGlProbe,
    #[serde(default)]
    pub screen: ScreenInfo,
    #[serde(default)]
    pub browser: BrowserInfo,
}

impl FingerprintProbe {
    /// Assemble the immutable fingerprint
    pub fn capture(&self, now_ms: i64) -> Fingerprint {
        let canvas_hash = match self.canvas_data_url.as_deref() {
            Some(data_url) if !data_url.is_empty() => canvas_hash(data_url),
            _ => CANVAS_ERROR.to_string(),
        };

        let webgl_vendor_renderer = match &self.webgl {
            WebGlProbe::Unsupported => WEBGL_NOT_SUPPORTED.to_string(),
            WebGlProbe::Error => WEBGL_ERROR.to_string(),
            WebGlProbe::Available { vendor, renderer } => format!(
                "{}|{}",
                vendor.as_deref().unwrap_or(UNKNOWN),
                renderer.as_deref().unwrap_or(UNKNOWN)
            ),
        };

        Fingerprint {
            canvas_hash,
            webgl_vendor_renderer,
            screen_info: self.screen.clone(),
            browser_info: self.browser.clone(),
            captured_at: now_ms,
        }
    }
}

/// 32-bit rolling hash (`h = h * 31 + unit`) over the UTF-16 code units of
/// the canvas data URL, rendered as signed lowercase hex.
pub fn canvas_hash(data_url: &str) -> String {
    let hash = data_url
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_shl(5).wrapping_sub(h).wrapping_add(unit as i32));

    if hash < 0 {
        format!("-{:x}", hash.unsigned_abs())
    } else {
        format!("{:x}", hash)
    }
}

/// Signal checks and digest over a captured fingerprint
pub trait FingerprintSignals {
    /// Canvas hash present and not a failure sentinel
    fn has_canvas_signal(&self) -> bool;

    /// WebGL descriptor present and not a failure sentinel
    fn has_webgl_signal(&self) -> bool;

    /// SHA-256 hex digest over the stable fields (excludes capture time)
    fn digest(&self) -> String;
}

impl FingerprintSignals for Fingerprint {
    fn has_canvas_signal(&self) -> bool {
        !self.canvas_hash.is_empty() && self.canvas_hash != CANVAS_ERROR
    }

    fn has_webgl_signal(&self) -> bool {
        !self.webgl_vendor_renderer.is_empty()
            && self.webgl_vendor_renderer != WEBGL_NOT_SUPPORTED
            && self.webgl_vendor_renderer != WEBGL_ERROR
    }

    fn digest(&self) -> String {
        let screen = &self.screen_info;
        let browser = &self.browser_info;

        let geometry = format!(
            "{}x{}x{}@{}",
            screen.width, screen.height, screen.color_depth, screen.device_pixel_ratio
        );
        let concurrency = browser.hardware_concurrency.to_string();

        let mut hasher = Sha256::new();
        for part in [
            self.canvas_hash.as_str(),
            self.webgl_vendor_renderer.as_str(),
            geometry.as_str(),
            browser.user_agent.as_str(),
            browser.languages.as_str(),
            browser.platform.as_str(),
            browser.timezone.as_str(),
            concurrency.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"\x1f");
        }

        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> FingerprintProbe {
        FingerprintProbe {
            canvas_data_url: Some("data:image/png;base64,iVBORw0KGgo".to_string()),
            webgl: WebGlProbe::Available {
                vendor: Some("Intel Inc.".to_string()),
                renderer: None,
            },
            screen: ScreenInfo {
                width: 1920,
                height: 1080,
                color_depth: 24,
                device_pixel_ratio: 1.0,
                ..Default::default()
            },
            browser: BrowserInfo {
                user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
                timezone: "Europe/Istanbul".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_canvas_hash_matches_rolling_hash() {
        assert_eq!(canvas_hash("a"), "61");
        assert_eq!(canvas_hash("ab"), format!("{:x}", 97 * 31 + 98));
        // long inputs wrap into negative values
        let long = "data:image/png;base64,".repeat(8);
        let h = canvas_hash(&long);
        assert!(!h.is_empty());
        assert_eq!(h, canvas_hash(&long));
    }

    #[test]
    fn test_capture_fills_sentinels() {
        let fp = probe().capture(1_000);
        assert_eq!(fp.webgl_vendor_renderer, "Intel Inc.|unknown");
        assert!(fp.has_canvas_signal());
        assert!(fp.has_webgl_signal());
        assert_eq!(fp.captured_at, 1_000);

        let broken = FingerprintProbe {
            canvas_data_url: None,
            webgl: WebGlProbe::Error,
            ..probe()
        }
        .capture(1_000);
        assert_eq!(broken.canvas_hash, CANVAS_ERROR);
        assert_eq!(broken.webgl_vendor_renderer, WEBGL_ERROR);
        assert!(!broken.has_canvas_signal());
        assert!(!broken.has_webgl_signal());

        let unsupported = FingerprintProbe::default().capture(0);
        assert_eq!(unsupported.webgl_vendor_renderer, WEBGL_NOT_SUPPORTED);
        assert!(!unsupported.has_webgl_signal());
    }

    #[test]
    fn test_digest_ignores_capture_time() {
        let a = probe().capture(1);
        let b = probe().capture(99_999);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);

        let other = FingerprintProbe {
            canvas_data_url: Some("data:image/png;base64,AAAA".to_string()),
            ..probe()
        }
        .capture(1);
        assert_ne!(a.digest(), other.digest());
    }
}
