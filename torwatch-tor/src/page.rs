//! Page content extraction
//!
//! Pulls the title and the visible body text out of a fetched document.

use scraper::node::Node;
use scraper::{Html, Selector};
use std::sync::LazyLock;

use torwatch_core::{collapse_whitespace, truncate_chars};

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Title and visible text of an HTML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    /// Trimmed `<title>` text; `None` if missing or blank
    pub title: Option<String>,
    /// Whitespace-collapsed visible body text
    pub text: String,
}

impl PageContent {
    /// First `max` characters of the visible text
    pub fn preview(&self, max: usize) -> String {
        truncate_chars(&self.text, max)
    }
}

/// Extract title and text content from HTML
pub fn extract_page(html: &str) -> PageContent {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let text = match document.select(&BODY).next() {
        Some(body) => {
            let mut raw_text = String::new();

            // Text nodes are concatenated as-is so inline markup never splits
            // a word; script/style/noscript subtrees are skipped
            for node_ref in body.descendants() {
                if let Node::Text(text_node) = node_ref.value() {
                    let in_excluded = node_ref.ancestors().any(|ancestor| {
                        ancestor
                            .value()
                            .as_element()
                            .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                            .unwrap_or(false)
                    });

                    if !in_excluded {
                        raw_text.push_str(text_node);
                    }
                }
            }

            collapse_whitespace(&raw_text)
        }
        None => String::new(),
    };

    PageContent { title, text }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_page() {
        let html = r#"
            <html>
            <head><title>  Test
                Page </title></head>
            <body>
                <script>var x = 1;</script>
                <h1>Hello World</h1>
                <p>This is   test content.</p>
                <style>.x { color: red; }</style>
                <noscript>enable js</noscript>
            </body>
            </html>
        "#;

        let page = extract_page(html);

        assert_eq!(page.title.as_deref(), Some("Test Page"));
        assert_eq!(page.text, "Hello World This is test content.");
    }

    #[test]
    fn test_inline_markup_keeps_words_whole() {
        let page = extract_page(
            "<html><body><p>Wel<b>come</b> to the <i>mar</i>ket, price 5<sup>th</sup></p></body></html>",
        );
        assert_eq!(page.text, "Welcome to the market, price 5th");
    }

    #[test]
    fn test_block_boundaries_keep_their_whitespace() {
        let page = extract_page("<body><div>alpha</div>\n<div>beta <span>gamma</span></div></body>");
        assert_eq!(page.text, "alpha beta gamma");
    }

    #[test]
    fn test_blank_title_is_none() {
        let page = extract_page("<html><head><title>  </title></head><body>x</body></html>");
        assert!(page.title.is_none());
        assert_eq!(page.text, "x");
    }

    #[test]
    fn test_preview_truncates_by_chars() {
        let body = "é".repeat(800);
        let page = extract_page(&format!("<html><body><p>{}</p></body></html>", body));
        assert_eq!(page.preview(500).chars().count(), 500);
    }

    #[test]
    fn test_non_html_body() {
        let page = extract_page("plain text error page");
        assert!(page.title.is_none());
        assert_eq!(page.text, "plain text error page");
    }
}
