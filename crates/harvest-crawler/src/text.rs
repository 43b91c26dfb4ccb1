//! Visible text of HTML pages.

use scraper::{Html, Node};

const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "noscript", "template"];

/// Returns the text a reader would see, whitespace collapsed.
pub fn visible_text(page: &str) -> String {
    let html = Html::parse_document(page);
    let mut words = Vec::new();
    for node in html.tree.root().descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map_or(false, |elem| HIDDEN_ELEMENTS.contains(&elem.name()))
            });
            if !hidden {
                words.extend(text.split_whitespace());
            }
        }
    }
    words.join(" ")
}

pub fn word_count(page: &str) -> usize {
    visible_text(page).split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_scripts_and_styles() {
        let page = r#"
            <html>
              <head><title>Ignored</title><style>p { color: red; }</style></head>
              <body>
                <h1>Spartan   Daily</h1>
                <script>var x = "hidden words";</script>
                <p>Campus <b>news</b></p>
              </body>
            </html>
        "#;
        assert_eq!(visible_text(page), "Spartan Daily Campus news");
        assert_eq!(word_count(page), 4);
    }

    #[test]
    fn empty_body_has_no_words() {
        assert_eq!(word_count("<html><body>  </body></html>"), 0);
    }
}
