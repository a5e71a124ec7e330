//! HTML content sanitizer.
//!
//! Inbound mail HTML is untrusted. The sanitizer rewrites it against a tag
//! and per-tag attribute allow-list, keeping the layout constructs that
//! forwarded business correspondence relies on (tables, inline styles,
//! fonts, inline images) while guaranteeing the output carries no
//! executable script construct.
//!
//! Rules:
//! - Tags not on the allow-list are stripped; their inner text is kept,
//!   except for containers whose content is itself dangerous or useless
//!   (`script`, `style`, `iframe`, `object`, `embed`, `head`, `title`,
//!   `svg`, `math`), which are dropped wholesale.
//! - Attributes not allowed for the tag are dropped; `on*` handlers never
//!   survive.
//! - `href`/`src` values must be scheme-less or use `http`, `https`,
//!   `mailto`, or `cid`.
//! - `style` values containing `expression(`, `javascript:`, or `url(`
//!   with a non-allowed scheme are dropped.
//! - Comments, doctypes and processing instructions are removed.

use std::collections::{HashMap, HashSet};

/// URL schemes allowed in link and image references.
const ALLOWED_SCHEMES: [&str; 4] = ["http", "https", "mailto", "cid"];

/// Attributes allowed on any tag.
const GLOBAL_ATTRS: [&str; 7] = ["style", "class", "align", "valign", "width", "height", "dir"];

/// Tags whose entire content is dropped along with the tag.
const DROP_CONTENT_TAGS: [&str; 9] = [
    "script", "style", "iframe", "object", "embed", "head", "title", "svg", "math",
];

/// HTML sanitizer with a fixed allow-list.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    allowed_tags: HashMap<&'static str, Vec<&'static str>>,
    drop_content: HashSet<&'static str>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    /// Creates a sanitizer with the default allow-list.
    #[must_use]
    pub fn new() -> Self {
        let mut allowed_tags: HashMap<&'static str, Vec<&'static str>> = HashMap::new();

        for tag in [
            "b", "i", "em", "strong", "u", "s", "p", "br", "hr", "div", "span", "blockquote",
            "pre", "code", "ul", "ol", "li", "small", "sub", "sup", "center", "h1", "h2", "h3",
            "h4", "h5", "h6", "caption", "thead", "tbody", "tfoot", "tr",
        ] {
            allowed_tags.insert(tag, Vec::new());
        }
        allowed_tags.insert("a", vec!["href", "title", "target"]);
        allowed_tags.insert("img", vec!["src", "alt", "title", "border"]);
        allowed_tags.insert(
            "table",
            vec!["border", "cellpadding", "cellspacing", "bgcolor"],
        );
        allowed_tags.insert("td", vec!["colspan", "rowspan", "bgcolor"]);
        allowed_tags.insert("th", vec!["colspan", "rowspan", "bgcolor"]);
        allowed_tags.insert("font", vec!["color", "face", "size"]);

        Self {
            allowed_tags,
            drop_content: DROP_CONTENT_TAGS.into_iter().collect(),
        }
    }

    /// Sanitizes an HTML fragment.
    #[must_use]
    pub fn sanitize(&self, html: &str) -> String {
        let mut out = String::with_capacity(html.len());
        let bytes = html.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() {
            let Some(open) = html[pos..].find('<').map(|i| pos + i) else {
                out.push_str(&html[pos..]);
                break;
            };

            out.push_str(&html[pos..open]);

            // Comments, doctypes, processing instructions.
            if html[open..].starts_with("<!--") {
                pos = html[open..]
                    .find("-->")
                    .map_or(bytes.len(), |i| open + i + 3);
                continue;
            }
            if html[open..].starts_with("<!") || html[open..].starts_with("<?") {
                pos = html[open..].find('>').map_or(bytes.len(), |i| open + i + 1);
                continue;
            }

            let Some(tag) = parse_tag(&html[open..]) else {
                // Stray `<` with no closing `>`: drop the rest, it cannot
                // be rendered as markup safely.
                break;
            };
            let after_tag = open + tag.len;

            if !tag.closing && self.drop_content.contains(tag.name.as_str()) {
                pos = skip_dropped_content(html, after_tag, &tag.name);
                continue;
            }

            if let Some(extra) = self.allowed_tags.get(tag.name.as_str()) {
                self.emit_tag(&mut out, &tag, extra);
            }
            // Disallowed tag: markup dropped, surrounding text kept.

            pos = after_tag;
        }

        out
    }

    /// Emits an allowed tag with its surviving attributes.
    fn emit_tag(&self, out: &mut String, tag: &Tag, extra_attrs: &[&'static str]) {
        if tag.closing {
            out.push_str("</");
            out.push_str(&tag.name);
            out.push('>');
            return;
        }

        out.push('<');
        out.push_str(&tag.name);

        for (name, value) in &tag.attributes {
            if !self.attribute_allowed(name, extra_attrs) {
                continue;
            }
            let Some(value) = safe_attribute_value(name, value) else {
                continue;
            };
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&value.replace('"', "&quot;"));
            out.push('"');
        }

        if tag.self_closing {
            out.push_str(" /");
        }
        out.push('>');
    }

    /// Whether an attribute name survives for a tag.
    fn attribute_allowed(&self, name: &str, extra_attrs: &[&'static str]) -> bool {
        if name.starts_with("on") {
            return false;
        }
        GLOBAL_ATTRS.contains(&name) || extra_attrs.contains(&name)
    }
}

/// A parsed tag: name, attributes, and how many input bytes it spans.
struct Tag {
    name: String,
    attributes: Vec<(String, String)>,
    closing: bool,
    self_closing: bool,
    len: usize,
}

/// Parses a tag starting at `<`. Returns `None` when no closing `>` exists.
fn parse_tag(input: &str) -> Option<Tag> {
    let mut chars = input.char_indices().skip(1).peekable();

    let closing = matches!(chars.peek(), Some((_, '/')));
    if closing {
        chars.next();
    }

    let mut name = String::new();
    while let Some((_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
            chars.next();
        } else {
            break;
        }
    }
    if name.is_empty() {
        // Not a tag (e.g. `<3`); consume just up to the next `>` so the
        // malformed markup cannot smuggle anything through.
        let end = input.find('>')?;
        return Some(Tag {
            name,
            attributes: Vec::new(),
            closing: false,
            self_closing: false,
            len: end + 1,
        });
    }

    let mut attributes = Vec::new();
    let mut self_closing = false;

    loop {
        // Skip whitespace between attributes.
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
            chars.next();
        }

        match chars.peek() {
            None => return None,
            Some((i, '>')) => {
                let len = i + 1;
                return Some(Tag {
                    name,
                    attributes,
                    closing,
                    self_closing,
                    len,
                });
            }
            Some((_, '/')) => {
                self_closing = true;
                chars.next();
            }
            Some(_) => {
                let mut attr_name = String::new();
                while let Some((_, c)) = chars.peek() {
                    if c.is_whitespace() || *c == '=' || *c == '>' || *c == '/' {
                        break;
                    }
                    attr_name.push(c.to_ascii_lowercase());
                    chars.next();
                }

                let mut value = String::new();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    match chars.peek() {
                        Some((_, quote @ ('"' | '\''))) => {
                            let quote = *quote;
                            chars.next();
                            for (_, c) in chars.by_ref() {
                                if c == quote {
                                    break;
                                }
                                value.push(c);
                            }
                        }
                        _ => {
                            while let Some((_, c)) = chars.peek() {
                                if c.is_whitespace() || *c == '>' {
                                    break;
                                }
                                value.push(*c);
                                chars.next();
                            }
                        }
                    }
                }

                if !attr_name.is_empty() {
                    attributes.push((attr_name, value));
                }
            }
        }
    }
}

/// Skips past the matching close tag of a dropped container.
///
/// Byte-wise ASCII-case-insensitive scan; returned offsets always land
/// right after an ASCII `>`, so they stay on UTF-8 boundaries.
fn skip_dropped_content(html: &str, from: usize, name: &str) -> usize {
    let close = format!("</{name}");
    let haystack = html.as_bytes();
    let needle = close.as_bytes();

    let mut i = from;
    while i + needle.len() <= haystack.len() {
        if haystack[i..i + needle.len()].eq_ignore_ascii_case(needle) {
            let after = i + needle.len();
            return haystack[after..]
                .iter()
                .position(|&b| b == b'>')
                .map_or(html.len(), |j| after + j + 1);
        }
        i += 1;
    }
    html.len()
}

/// Validates an attribute value, returning the value to emit.
fn safe_attribute_value(name: &str, value: &str) -> Option<String> {
    match name {
        "href" | "src" => {
            if url_scheme_allowed(value) {
                Some(value.to_string())
            } else {
                None
            }
        }
        "style" => {
            let lower = value.to_lowercase();
            if lower.contains("expression(") || lower.contains("javascript:") {
                return None;
            }
            // url(...) in CSS may reference an external fetch vector.
            if let Some(i) = lower.find("url(") {
                let inner = lower[i + 4..].trim_start_matches(['\'', '"', ' ']);
                if !url_scheme_allowed(inner) {
                    return None;
                }
            }
            Some(value.to_string())
        }
        _ => Some(value.to_string()),
    }
}

/// Checks a URL against the scheme allow-list.
///
/// Scheme-less (relative) references are allowed. Control characters and
/// whitespace are removed before scheme detection, defeating
/// `java\tscript:` obfuscation.
fn url_scheme_allowed(url: &str) -> bool {
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let lower = cleaned.to_lowercase();

    let Some(colon) = lower.find(':') else {
        return true;
    };

    // A slash, query, or fragment before the colon means the colon is not
    // a scheme separator.
    if lower[..colon].contains(['/', '?', '#']) {
        return true;
    }

    ALLOWED_SCHEMES.contains(&&lower[..colon])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sanitize(html: &str) -> String {
        Sanitizer::new().sanitize(html)
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(sanitize("Hello, world"), "Hello, world");
    }

    #[test]
    fn test_allowed_markup_kept() {
        assert_eq!(
            sanitize("<p>Hello <b>world</b></p>"),
            "<p>Hello <b>world</b></p>"
        );
    }

    #[test]
    fn test_script_dropped_with_content() {
        assert_eq!(
            sanitize("before<script>alert('x')</script>after"),
            "beforeafter"
        );
    }

    #[test]
    fn test_script_case_insensitive() {
        assert_eq!(sanitize("a<SCRIPT>alert(1)</SCRIPT>b"), "ab");
        assert_eq!(sanitize("a<ScRiPt>alert(1)</sCrIpT>b"), "ab");
    }

    #[test]
    fn test_unclosed_script_drops_rest() {
        assert_eq!(sanitize("a<script>alert(1)"), "a");
    }

    #[test]
    fn test_event_handlers_stripped() {
        let out = sanitize("<p onclick=\"evil()\" onmouseover='evil()'>text</p>");
        assert_eq!(out, "<p>text</p>");
    }

    #[test]
    fn test_javascript_href_stripped() {
        let out = sanitize("<a href=\"javascript:alert(1)\">link</a>");
        assert_eq!(out, "<a>link</a>");
    }

    #[test]
    fn test_obfuscated_scheme_stripped() {
        let out = sanitize("<a href=\"java\tscript:alert(1)\">link</a>");
        assert_eq!(out, "<a>link</a>");
        let out = sanitize("<a href=\" jAvAsCrIpT:alert(1)\">link</a>");
        assert_eq!(out, "<a>link</a>");
    }

    #[test]
    fn test_allowed_schemes_kept() {
        for url in [
            "https://example.com/x",
            "http://example.com",
            "mailto:a@b.com",
            "cid:image001",
            "/relative/path",
        ] {
            let out = sanitize(&format!("<a href=\"{url}\">l</a>"));
            assert!(out.contains("href="), "dropped allowed url {url}");
        }
    }

    #[test]
    fn test_data_url_img_stripped() {
        let out = sanitize("<img src=\"data:text/html;base64,PHNjcmlwdD4=\">");
        assert_eq!(out, "<img>");
    }

    #[test]
    fn test_cid_img_kept() {
        let out = sanitize("<img src=\"cid:logo@local\" alt=\"logo\">");
        assert_eq!(out, "<img src=\"cid:logo@local\" alt=\"logo\">");
    }

    #[test]
    fn test_table_layout_preserved() {
        let input = "<table border=\"1\" cellpadding=\"2\"><tr><td colspan=\"2\" style=\"color: red\">x</td></tr></table>";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn test_style_expression_dropped() {
        let out = sanitize("<div style=\"width:expression(alert(1))\">x</div>");
        assert_eq!(out, "<div>x</div>");
    }

    #[test]
    fn test_style_bad_url_dropped() {
        let out = sanitize("<div style=\"background:url(javascript:alert(1))\">x</div>");
        assert_eq!(out, "<div>x</div>");
        let kept = sanitize("<div style=\"background:url(https://x.com/a.png)\">x</div>");
        assert!(kept.contains("style="));
    }

    #[test]
    fn test_unknown_tag_keeps_inner_text() {
        assert_eq!(sanitize("<form><input>text</form>"), "text");
        assert_eq!(sanitize("<body><p>x</p></body>"), "<p>x</p>");
    }

    #[test]
    fn test_comments_and_doctype_removed() {
        assert_eq!(sanitize("<!DOCTYPE html><!-- hidden -->visible"), "visible");
    }

    #[test]
    fn test_iframe_dropped_with_content() {
        assert_eq!(sanitize("a<iframe src=\"https://x\">inner</iframe>b"), "ab");
    }

    #[test]
    fn test_self_closing() {
        assert_eq!(sanitize("line<br/>break<hr />"), "line<br />break<hr />");
    }

    #[test]
    fn test_truncated_tag_dropped() {
        assert_eq!(sanitize("text<img src=\"x"), "text");
    }

    #[test]
    fn test_font_tag() {
        let input = "<font color=\"#333\" face=\"Arial\" size=\"2\">x</font>";
        assert_eq!(sanitize(input), input);
    }

    mod safety_property {
        use super::*;
        use proptest::prelude::*;

        fn assert_safe(out: &str) {
            let lower = out.to_lowercase();
            assert!(!lower.contains("<script"), "script tag survived: {out}");
            assert!(!lower.contains("javascript:"), "js url survived: {out}");
            for window in ["onclick=", "onerror=", "onload=", "onmouseover="] {
                assert!(!lower.contains(window), "handler survived: {out}");
            }
        }

        proptest! {
            #[test]
            fn sanitized_output_never_executes(fragments in proptest::collection::vec(
                prop_oneof![
                    Just("<script>alert(1)</script>".to_string()),
                    Just("<img src=x onerror=alert(1)>".to_string()),
                    Just("<a href=\"javascript:alert(1)\">x</a>".to_string()),
                    Just("<ScRiPt>x</ScRiPt>".to_string()),
                    Just("<div onclick=\"x\">".to_string()),
                    Just("<p>legit</p>".to_string()),
                    Just("plain text".to_string()),
                    "[a-zA-Z<>\"'/= ]{0,40}",
                ],
                0..8,
            )) {
                let input: String = fragments.concat();
                let out = Sanitizer::new().sanitize(&input);
                assert_safe(&out);
            }
        }
    }
}
