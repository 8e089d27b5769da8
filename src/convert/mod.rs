//! HTML to Markdown conversion for Confluence storage bodies and Bitbucket
//! comment markup.
//!
//! The converter walks the `scraper` DOM once. Block elements become
//! paragraphs separated by blank lines; inline elements are rendered into
//! the surrounding paragraph. Unknown elements contribute their text.
//! Confluence `code`/`noformat` macros become fenced code blocks.

use scraper::{ElementRef, Html, Node};

const CODE_MACROS: [&str; 2] = ["code", "noformat"];
const SKIPPED: [&str; 5] = ["script", "style", "head", "ac:parameter", "template"];

/// Converts an HTML fragment to Markdown. Blank input yields an empty string.
#[must_use]
pub fn html_to_markdown(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    let blocks = render_blocks(fragment.root_element());
    blocks.join("\n\n").trim().to_owned()
}

fn render_blocks(parent: ElementRef<'_>) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut inline = String::new();
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => inline.push_str(&collapse_whitespace(text)),
            Node::Element(_) => {
                let Some(element) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_block(element) {
                    flush_paragraph(&mut inline, &mut blocks);
                    blocks.extend(render_block(element));
                } else {
                    inline.push_str(&render_inline(element));
                }
            }
            _ => {}
        }
    }
    flush_paragraph(&mut inline, &mut blocks);
    blocks
}

fn flush_paragraph(inline: &mut String, blocks: &mut Vec<String>) {
    let paragraph = tidy_lines(inline);
    if !paragraph.is_empty() {
        blocks.push(paragraph);
    }
    inline.clear();
}

fn tidy_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

fn name(element: ElementRef<'_>) -> &str {
    element.value().name()
}

fn is_block(element: ElementRef<'_>) -> bool {
    matches!(
        name(element),
        "p" | "div"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "main"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "pre"
            | "blockquote"
            | "table"
            | "hr"
            | "ac:structured-macro"
            | "ac:rich-text-body"
            | "ac:layout"
            | "ac:layout-section"
            | "ac:layout-cell"
    )
}

fn render_block(element: ElementRef<'_>) -> Vec<String> {
    let tag = name(element);
    if let Some(level) = heading_level(tag) {
        let text = tidy_lines(&render_inline_children(element)).replace('\n', " ");
        return non_empty(format!("{} {text}", "#".repeat(level)), &text);
    }
    match tag {
        "p" => {
            let text = tidy_lines(&render_inline_children(element));
            non_empty(text.clone(), &text)
        }
        "ul" => non_empty_block(render_list(element, false, 0)),
        "ol" => non_empty_block(render_list(element, true, 0)),
        "pre" => vec![fence(&raw_text(element), None)],
        "blockquote" => non_empty_block(quote(&render_blocks(element).join("\n\n"))),
        "table" => non_empty_block(render_table(element)),
        "hr" => vec!["---".to_owned()],
        "ac:structured-macro" => render_macro(element),
        _ => render_blocks(element),
    }
}

fn non_empty(block: String, content: &str) -> Vec<String> {
    if content.trim().is_empty() {
        Vec::new()
    } else {
        vec![block]
    }
}

fn non_empty_block(block: String) -> Vec<String> {
    if block.trim().is_empty() {
        Vec::new()
    } else {
        vec![block]
    }
}

fn heading_level(tag: &str) -> Option<usize> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn render_macro(element: ElementRef<'_>) -> Vec<String> {
    let macro_name = element.value().attr("ac:name").unwrap_or_default();
    if !CODE_MACROS.contains(&macro_name) {
        return render_blocks(element);
    }
    let language = element
        .children()
        .filter_map(ElementRef::wrap)
        .find(|child| {
            name(*child) == "ac:parameter" && child.value().attr("ac:name") == Some("language")
        })
        .map(|child| child.text().collect::<String>());
    let body = element
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|child| name(*child) == "ac:plain-text-body")
        .map(raw_text)
        .unwrap_or_default();
    vec![fence(&body, language.as_deref())]
}

fn fence(body: &str, language: Option<&str>) -> String {
    let trimmed = body.trim_matches('\n');
    let ticks = code_fence(trimmed);
    format!(
        "{ticks}{}\n{trimmed}\n{ticks}",
        language.map(str::trim).unwrap_or_default()
    )
}

/// Returns a backtick fence one longer than the longest backtick run in
/// `content`, and never shorter than three.
#[must_use]
pub fn code_fence(content: &str) -> String {
    let longest_run = content.split(|c| c != '`').map(str::len).max().unwrap_or(0);
    "`".repeat(longest_run.max(2).saturating_add(1))
}

/// Text of an element with whitespace preserved, including CDATA sections
/// (which the HTML parser reports as comments).
fn raw_text(element: ElementRef<'_>) -> String {
    element
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(text.to_string()),
            Node::Comment(comment) => comment
                .strip_prefix("[CDATA[")
                .map(|inner| inner.strip_suffix("]]").unwrap_or(inner).to_owned()),
            _ => None,
        })
        .collect()
}

fn quote(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_owned()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_list(list: ElementRef<'_>, ordered: bool, depth: usize) -> String {
    let indent = "  ".repeat(depth);
    let mut lines = Vec::new();
    let items = list
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| name(*child) == "li");
    for (position, item) in items.enumerate() {
        let marker = if ordered {
            format!("{}.", position.saturating_add(1))
        } else {
            "-".to_owned()
        };
        let mut text = String::new();
        let mut nested = Vec::new();
        for child in item.children() {
            match child.value() {
                Node::Text(content) => text.push_str(&collapse_whitespace(content)),
                Node::Element(_) => {
                    let Some(element) = ElementRef::wrap(child) else {
                        continue;
                    };
                    match name(element) {
                        "ul" => nested.push(render_list(element, false, depth.saturating_add(1))),
                        "ol" => nested.push(render_list(element, true, depth.saturating_add(1))),
                        "p" | "div" => {
                            text.push(' ');
                            text.push_str(&render_inline_children(element));
                        }
                        _ => text.push_str(&render_inline(element)),
                    }
                }
                _ => {}
            }
        }
        let item_text = tidy_lines(&text).replace('\n', " ");
        lines.push(format!("{indent}{marker} {item_text}").trim_end().to_owned());
        lines.extend(nested.into_iter().filter(|block| !block.is_empty()));
    }
    lines.join("\n")
}

fn render_table(table: ElementRef<'_>) -> String {
    let rows: Vec<Vec<String>> = table
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| name(*element) == "tr")
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(name(*cell), "td" | "th"))
                .map(|cell| {
                    tidy_lines(&render_inline_children(cell))
                        .replace('\n', " ")
                        .replace('|', "\\|")
                })
                .collect()
        })
        .filter(|cells: &Vec<String>| !cells.is_empty())
        .collect();
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let mut lines = Vec::with_capacity(rows.len().saturating_add(1));
    for (index, row) in rows.iter().enumerate() {
        let mut cells = row.clone();
        cells.resize(width, String::new());
        lines.push(format!("| {} |", cells.join(" | ")));
        if index == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    lines.join("\n")
}

fn render_inline_children(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&collapse_whitespace(text)),
            Node::Element(_) => {
                if let Some(nested) = ElementRef::wrap(child) {
                    out.push_str(&render_inline(nested));
                }
            }
            _ => {}
        }
    }
    out
}

fn render_inline(element: ElementRef<'_>) -> String {
    let tag = name(element);
    if SKIPPED.contains(&tag) {
        return String::new();
    }
    match tag {
        "strong" | "b" => emphasise("**", &render_inline_children(element)),
        "em" | "i" => emphasise("_", &render_inline_children(element)),
        "s" | "del" | "strike" => emphasise("~~", &render_inline_children(element)),
        "code" | "tt" => inline_code(&element.text().collect::<String>()),
        "br" => "\n".to_owned(),
        "a" => link(element),
        "img" => image(element),
        _ if is_block(element) => format!("\n{}\n", render_blocks(element).join("\n")),
        _ => render_inline_children(element),
    }
}

fn emphasise(marker: &str, inner: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_owned();
    }
    let lead = if inner.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if inner.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{marker}{trimmed}{marker}{trail}")
}

fn inline_code(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains('`') {
        format!("`` {trimmed} ``")
    } else {
        format!("`{trimmed}`")
    }
}

fn link(element: ElementRef<'_>) -> String {
    let text = render_inline_children(element);
    let label = text.trim();
    let href = element.value().attr("href").map(str::trim).unwrap_or_default();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return text;
    }
    if label.is_empty() {
        return format!("<{href}>");
    }
    format!("[{label}]({href})")
}

fn image(element: ElementRef<'_>) -> String {
    let alt = element.value().attr("alt").unwrap_or_default();
    element
        .value()
        .attr("src")
        .filter(|src| !src.trim().is_empty())
        .map_or_else(|| alt.to_owned(), |src| format!("![{alt}]({src})"))
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for character in text.chars() {
        if character.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(character);
        }
    }
    if pending_space {
        out.push(' ');
    }
    out
}
