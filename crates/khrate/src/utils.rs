use chrono::Utc;
use scraper::{ElementRef, Node};

pub fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "tfoot", "thead",
    "tr", "ul",
];

/// Rough equivalent of the DOM `innerText` property: whitespace inside text
/// nodes collapses to single spaces, while `<br>` and block-level elements
/// start a new line.
pub fn inner_text(element: ElementRef) -> String {
    let mut out = String::new();
    push_inner_text(element, &mut out);
    out.trim().to_string()
}

fn push_inner_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_collapsed(text, out),
            Node::Element(el) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                match el.name() {
                    "script" | "style" | "template" => {}
                    "br" => {
                        if out.ends_with(' ') {
                            out.pop();
                        }
                        out.push('\n');
                    }
                    name if BLOCK_ELEMENTS.contains(&name) => {
                        line_break(out);
                        push_inner_text(child, out);
                        line_break(out);
                    }
                    _ => push_inner_text(child, out),
                }
            }
            _ => {}
        }
    }
}

fn push_collapsed(text: &str, out: &mut String) {
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() && !out.ends_with(['\n', ' ']) {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    if pending_space && !out.is_empty() && !out.ends_with(['\n', ' ']) {
        out.push(' ');
    }
}

/// Adjacent block boundaries share one line break.
fn line_break(out: &mut String) {
    if out.ends_with(' ') {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Today's date in UTC as `YYYY-MM-DD`.
pub fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first_td(html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let td = Selector::parse("td").unwrap();
        inner_text(fragment.select(&td).next().unwrap())
    }

    #[test]
    fn test_inner_text_breaks_on_br() {
        let text = first_td("<table><tr><td>\n  2024-01-15 <br> note</td></tr></table>");
        assert_eq!(text, "2024-01-15\nnote");
    }

    #[test]
    fn test_inner_text_joins_inline_elements() {
        let text = first_td("<table><tr><td><b>4,100</b>  <span>Riel</span></td></tr></table>");
        assert_eq!(text, "4,100 Riel");
    }

    #[test]
    fn test_inner_text_breaks_around_block_elements() {
        let text = first_td("<table><tr><td>2024-01-15<div>note</div></td></tr></table>");
        assert_eq!(text, "2024-01-15\nnote");
    }

    #[test]
    fn test_inner_text_collapses_adjacent_block_breaks() {
        let text =
            first_td("<table><tr><td><p>2024-01-15</p> <p>note</p><br></td></tr></table>");
        assert_eq!(text, "2024-01-15\nnote");
    }

    #[test]
    fn test_inner_text_skips_scripts() {
        let text = first_td("<table><tr><td>4,100<script>var x = 1;</script></td></tr></table>");
        assert_eq!(text, "4,100");
    }

    #[test]
    fn test_today_format() {
        let today = today();
        assert_eq!(today.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&today, "%Y-%m-%d").is_ok());
    }
}
