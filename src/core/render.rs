//! Markdown to HTML conversion
//!
//! Runs after the feature pipeline. The generated table of contents is
//! lifted out of the Markdown before conversion so the Markdown parser never
//! sees the raw TOC HTML, and spliced back in afterwards.

use pulldown_cmark::{html, Options, Parser};
use crate::feature::standard::{TOC_PLACEHOLDER_END, TOC_PLACEHOLDER_START};

/// Marker left in the Markdown where the TOC goes back
pub const TOC_INSERTION_POINT: &str = "<!--TOC_INSERTION_POINT-->";

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options
}

/// Split the TOC placeholder out of `markdown`
///
/// Returns the Markdown with the placeholder replaced by
/// [`TOC_INSERTION_POINT`], and the TOC HTML if there was one.
fn lift_toc(markdown: &str) -> (String, Option<String>) {
    let Some(start) = markdown.find(TOC_PLACEHOLDER_START) else {
        return (markdown.to_string(), None);
    };
    let inner_start = start + TOC_PLACEHOLDER_START.len();
    let Some(inner_len) = markdown[inner_start..].find(TOC_PLACEHOLDER_END) else {
        return (markdown.to_string(), None);
    };
    let inner_end = inner_start + inner_len;
    let end = inner_end + TOC_PLACEHOLDER_END.len();

    let toc = markdown[inner_start..inner_end].to_string();
    let body = format!(
        "{}\n\n{}\n\n{}",
        &markdown[..start],
        TOC_INSERTION_POINT,
        &markdown[end..]
    );
    (body, Some(toc))
}

/// Convert pipeline output to an HTML fragment
pub fn to_html(markdown: &str) -> String {
    let (body, toc) = lift_toc(markdown);

    let parser = Parser::new_ext(&body, options());
    let mut output = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut output, parser);

    match toc {
        Some(toc) => output.replacen(TOC_INSERTION_POINT, &toc, 1),
        None => output,
    }
}
