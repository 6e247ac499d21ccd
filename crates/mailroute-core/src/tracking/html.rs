//! HTML body rewriting helpers
//!
//! Pure string transforms; persistence happens in the codec.

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Anchor href matcher: tag name, then any attributes in any order, the
/// href value in either quote style. (?is) makes it case-insensitive
/// and lets attributes span line breaks.
fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)(<a\b[^>]*?href\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
            .expect("href regex is valid")
    })
}

/// Whether a URL found in an anchor should be rewritten for tracking.
///
/// In-page anchors, already-tracked URLs, and anything that is neither
/// site-relative (`/...`) nor absolute (`http(s)://...`) are left alone;
/// protocol-relative `//...` counts as neither.
pub fn is_trackable_url(url: &str) -> bool {
    let url = url.trim();

    if url.is_empty() || url.starts_with('#') || url.contains("/track/click/") {
        return false;
    }

    if url.starts_with("//") {
        return false;
    }
    if url.starts_with('/') {
        return true;
    }

    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Rewrite every anchor href through the given mapping.
///
/// The callback returns the replacement URL, or None to leave the
/// original untouched. Quote style is preserved.
pub fn rewrite_anchor_hrefs<F>(html: &str, mut replace: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    href_regex()
        .replace_all(html, |caps: &Captures| {
            let prefix = &caps[1];
            let (quote, url) = match (caps.get(2), caps.get(3)) {
                (Some(m), _) => ('"', m.as_str()),
                (_, Some(m)) => ('\'', m.as_str()),
                _ => unreachable!("one alternative always matches"),
            };

            match replace(url) {
                Some(new_url) => format!("{}{}{}{}", prefix, quote, new_url, quote),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Collect the href values of all anchors in document order
pub fn collect_anchor_hrefs(html: &str) -> Vec<String> {
    href_regex()
        .captures_iter(html)
        .filter_map(|caps| {
            caps.get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// Insert a zero-size tracking pixel immediately before the closing body
/// tag, or append it when the document has none.
pub fn inject_pixel(html: &str, pixel_url: &str) -> String {
    let img = format!(
        r#"<img src="{}" width="1" height="1" style="display:none;border:0;" alt="" />"#,
        pixel_url
    );

    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + img.len());
            out.push_str(&html[..pos]);
            out.push_str(&img);
            out.push_str(&html[pos..]);
            out
        }
        None => {
            let mut out = html.to_string();
            out.push_str(&img);
            out
        }
    }
}
