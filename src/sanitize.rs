//! Markdown to HTML for user-authored text (reviews, product descriptions).
//!
//! Raw HTML in the source is rendered as escaped text, images are reduced to
//! their alt text, and links survive only with an http, https or mailto
//! destination (or a same-site relative path).

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};

pub fn markdown_to_safe_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let mut dropped_links = 0usize;
    let events = Parser::new_ext(source, options).filter_map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Some(Event::Text(raw)),
        Event::Start(Tag::Image { .. }) | Event::End(TagEnd::Image) => None,
        Event::Start(Tag::Link { ref dest_url, .. }) if !is_safe_url(dest_url) => {
            dropped_links += 1;
            None
        }
        Event::End(TagEnd::Link) if dropped_links > 0 => {
            dropped_links -= 1;
            None
        }
        other => Some(other),
    });

    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn is_safe_url(url: &str) -> bool {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") || lower.starts_with("mailto:") {
        return true;
    }
    if url.starts_with('#') {
        return true;
    }
    // Browsers read `\` as `/` and drop tabs and newlines, so `/\host` and
    // `/\t/host` are protocol-relative too.
    url.starts_with('/')
        && !url.starts_with("//")
        && !url.contains('\\')
        && !url.chars().any(|c| c.is_ascii_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_basic_markdown() {
        let html = markdown_to_safe_html("**great** fit, _true_ to size");
        assert!(html.contains("<strong>great</strong>"));
        assert!(html.contains("<em>true</em>"));
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = markdown_to_safe_html("hello <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));

        let block = markdown_to_safe_html("<div onclick=\"x()\">hi</div>");
        assert!(!block.contains("<div"));
    }

    #[test]
    fn javascript_links_lose_their_anchor_but_keep_text() {
        let html = markdown_to_safe_html("[click](javascript:alert(1))");
        assert!(!html.contains("href"));
        assert!(!html.to_lowercase().contains("javascript:"));
        assert!(html.contains("click"));
    }

    #[test]
    fn http_links_are_kept() {
        let html = markdown_to_safe_html("[shop](https://example.com/a)");
        assert!(html.contains(r#"<a href="https://example.com/a">shop</a>"#));
    }

    #[test]
    fn backslash_links_lose_their_anchor() {
        let html = markdown_to_safe_html(r"[shop](/\evil.example)");
        assert!(!html.contains("href"));
        assert!(html.contains("shop"));
    }

    #[test]
    fn images_become_alt_text() {
        let html = markdown_to_safe_html("![a cat](https://evil.example/track.gif)");
        assert!(!html.contains("<img"));
        assert!(html.contains("a cat"));
    }

    #[test]
    fn url_policy() {
        assert!(is_safe_url("mailto:help@example.com"));
        assert!(is_safe_url("/products/red-shirt"));
        assert!(!is_safe_url("//evil.example"));
        assert!(!is_safe_url("/\\evil.example"));
        assert!(!is_safe_url("/\t/evil.example"));
        assert!(!is_safe_url(" JavaScript:alert(1)"));
        assert!(!is_safe_url("data:text/html;base64,AAAA"));
    }
}
