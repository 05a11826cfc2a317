//! Standard document passes
//!
//! These passes always run on every render:
//! - Heading normalization with unique anchors
//! - Stray attribute token cleanup
//! - Table of contents generation
//! - Fenced block annotation, consumed later by the smart passes
//!
//! All passes skip fenced code blocks unless noted otherwise.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Marker comments wrapping the generated table of contents
pub const TOC_PLACEHOLDER_START: &str = "<!--TOC_PLACEHOLDER_START-->";
pub const TOC_PLACEHOLDER_END: &str = "<!--TOC_PLACEHOLDER_END-->";

/// Documents whose first H1 is further down than this get the TOC at the top
const TOC_H1_WINDOW: usize = 50;

lazy_static! {
    static ref FENCE: Regex = Regex::new(r"^```").unwrap();
    static ref ATX_HEADING: Regex =
        Regex::new(r"^(#{1,6})\s+(.*?)(\s*\{#([A-Za-z0-9_-]+)\})?\s*$").unwrap();
    static ref HEADING_WITH_ATTR: Regex =
        Regex::new(r"^(#{1,6})\s+.*\{#[A-Za-z0-9_-]+\}\s*$").unwrap();
    static ref TRAILING_ATTR: Regex = Regex::new(r"\s*\{#([A-Za-z0-9_-]+)\}\s*$").unwrap();
    static ref ANY_HEADING: Regex = Regex::new(r"^(#{1,6})\s+(.*)$").unwrap();
    static ref SETEXT_H1: Regex = Regex::new(r"^={3,}\s*$").unwrap();
    static ref SETEXT_H2: Regex = Regex::new(r"^-{3,}\s*$").unwrap();
    static ref SETEXT_ANY: Regex = Regex::new(r"^[=-]{3,}\s*$").unwrap();
    static ref STRAY_ATTR: Regex = Regex::new(r"\s*\{#?[A-Za-z0-9_-]+\}").unwrap();
    static ref LIST_ITEM: Regex = Regex::new(r"^\s*([*\-+]\s+|\d+[.)]\s+)").unwrap();
    static ref TABLE_ROW: Regex = Regex::new(r"^\s*\|").unwrap();
    static ref MD_LINK: Regex = Regex::new(r"\[[^\]]+\]\([^)]+\)").unwrap();
    static ref NUMBERED_PREFIX: Regex =
        Regex::new(r"^\s*(?:(\d+(?:\.\d+)*)[.)]?|([IVXLCDM]+|[A-Z])[.)])\s+").unwrap();
    static ref WORD: Regex = Regex::new(r"[A-Za-z']+").unwrap();
    static ref NON_SLUG: Regex = Regex::new(r"[^\w\s-]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref DASHES: Regex = Regex::new(r"-+").unwrap();
    static ref TOC_NUMBER_PREFIX: Regex =
        Regex::new(r"^\s*(?:\d+\.)+\s*|^\s*[IVXLCDMivxlcdm]+\.\s*|^\s*[A-Z]\.\s*").unwrap();
    static ref BOLD_STARS: Regex = Regex::new(r"\*\*([^*]+)\*\*").unwrap();
    static ref BOLD_UNDERSCORES: Regex = Regex::new(r"__([^_]+)__").unwrap();
    static ref ITALIC_STAR: Regex = Regex::new(r"\*([^*]+)\*").unwrap();
    static ref ITALIC_UNDERSCORE: Regex = Regex::new(r"_([^_]+)_").unwrap();
    static ref INLINE_CODE: Regex = Regex::new(r"`([^`]+)`").unwrap();
    static ref STRIKETHROUGH: Regex = Regex::new(r"~~([^~]+)~~").unwrap();
    pub(crate) static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?P<lang>[^\n]*)\n(?P<body>.*?)\n```").unwrap();
    pub(crate) static ref SIP_METHOD: Regex = Regex::new(
        r"\b(INVITE|ACK|BYE|CANCEL|REGISTER|OPTIONS|PRACK|SUBSCRIBE|NOTIFY|PUBLISH|INFO|REFER|MESSAGE|UPDATE)\b"
    )
    .unwrap();
    pub(crate) static ref SIP_RESPONSE_CODE: Regex =
        Regex::new(r"(?m)(?:^\s*|:\s*)[1-6]\d\d\b").unwrap();
    static ref PROGRAM_TOKEN: Regex = Regex::new(
        r"[;{}]|\s=\s|\breturn\s|\bfor\s|\bwhile\s|\bif\s*\(|\w(?:\+\+|--)|(?:\+\+|--)\w"
    )
    .unwrap();
    static ref FLOW_EDGE: Regex =
        Regex::new(r"\b[A-Za-z0-9_.-]{2,}\s*->\s*[A-Za-z0-9_.-]{2,}\b").unwrap();
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "if", "then", "than", "because", "as", "of", "at",
    "by", "for", "with", "about", "into", "through", "during", "before", "after", "above",
    "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
];

const AUX_VERBS: &[&str] = &[
    "is", "are", "was", "were", "be", "being", "been", "have", "has", "had", "do", "does", "did",
    "will", "shall", "can", "should", "may", "might", "must",
];

/// Turn heading text into an anchor id
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let cleaned = NON_SLUG.replace_all(&lowered, "");
    let dashed = WHITESPACE.replace_all(&cleaned, "-");
    let collapsed = DASHES.replace_all(&dashed, "-");
    collapsed.trim_matches('-').to_string()
}

/// Split into lines, remembering whether the text ended with a newline
fn split_lines(text: &str) -> (Vec<String>, bool) {
    (
        text.lines().map(str::to_string).collect(),
        text.ends_with('\n'),
    )
}

fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    out
}

/// Hands out anchors that are unique within one document
struct SlugAllocator {
    used: HashMap<String, usize>,
}

impl SlugAllocator {
    fn new(reserved: HashSet<String>) -> Self {
        Self {
            used: reserved.into_iter().map(|slug| (slug, 1)).collect(),
        }
    }

    fn allocate(&mut self, text: &str) -> String {
        let mut base = slugify(text);
        if base.is_empty() {
            base = "section".to_string();
        }
        let count = self.used.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}-{}", base, count)
        }
    }
}

fn is_title_case(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || words.len() > 15 {
        return false;
    }
    let capitalized = words
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_alphabetic() && c.is_uppercase()))
        .count();
    capitalized as f64 / words.len() as f64 >= 0.6
}

fn is_all_caps(text: &str) -> bool {
    let mut letters = text.chars().filter(|c| c.is_ascii_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| c.is_ascii_uppercase())
}

/// Heading depth implied by a numbering prefix such as "2.1" or "B)"
fn numeric_heading_level(text: &str) -> usize {
    match NUMBERED_PREFIX.captures(text) {
        Some(caps) => match caps.get(1) {
            Some(number) => number.as_str().matches('.').count() + 1,
            None => 1,
        },
        None => 0,
    }
}

fn is_horizontal_rule(line: &str) -> bool {
    let trimmed = line.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first @ ('-' | '*' | '_')) => trimmed.len() >= 3 && chars.all(|c| c == first),
        _ => false,
    }
}

fn is_blank(line: Option<&String>) -> bool {
    line.map_or(true, |l| l.trim().is_empty())
}

/// Whether an isolated line reads like a heading rather than prose
fn looks_like_heading(line: &str) -> bool {
    let trimmed = line.trim();
    let is_list_like = LIST_ITEM.is_match(line);
    let is_table_like = line.contains('|') && TABLE_ROW.is_match(line);
    let is_quote = trimmed.starts_with('>');
    let is_link_like =
        line.contains("http://") || line.contains("https://") || MD_LINK.is_match(line);

    if is_list_like || is_table_like || is_quote || is_link_like || is_horizontal_rule(line) {
        return false;
    }
    if trimmed.chars().count() > 80 || trimmed.ends_with('.') {
        return false;
    }
    if !(is_title_case(trimmed) || is_all_caps(trimmed) || numeric_heading_level(line) > 0) {
        return false;
    }

    let words: Vec<String> = WORD
        .find_iter(line)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    if words.is_empty() {
        return true;
    }
    let stop_count = words.iter().filter(|w| STOPWORDS.contains(&w.as_str())).count();
    let has_aux = words.iter().any(|w| AUX_VERBS.contains(&w.as_str()));
    stop_count as f64 / words.len() as f64 <= 0.5 && !has_aux
}

/// Normalize headings and give each one a unique `{#anchor}`
///
/// - ATX headings without an explicit anchor get one
/// - Setext headings (`===` / `---` underlines) become ATX headings
/// - Isolated, title-like lines are promoted; a numbering prefix decides the level
///
/// Explicit anchors already present in the document are reserved first so
/// generated anchors never collide with them.
pub fn normalize_headings(md: &str) -> String {
    let (lines, trailing_newline) = split_lines(md);

    let mut reserved = HashSet::new();
    let mut in_code = false;
    for line in &lines {
        if FENCE.is_match(line) {
            in_code = !in_code;
            continue;
        }
        if in_code {
            continue;
        }
        if let Some(caps) = ATX_HEADING.captures(line) {
            if let Some(anchor) = caps.get(4) {
                reserved.insert(anchor.as_str().to_string());
            }
        }
    }
    let mut slugs = SlugAllocator::new(reserved);

    let mut out = Vec::with_capacity(lines.len());
    let mut in_code = false;
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];

        if FENCE.is_match(line) {
            in_code = !in_code;
            out.push(line.clone());
            i += 1;
            continue;
        }
        if in_code {
            out.push(line.clone());
            i += 1;
            continue;
        }

        if let Some(caps) = ATX_HEADING.captures(line) {
            if caps.get(4).is_some() {
                out.push(line.clone());
            } else {
                let level = caps[1].len();
                let text = caps[2].trim();
                let slug = slugs.allocate(text);
                out.push(format!("{} {} {{#{}}}", "#".repeat(level), text, slug));
            }
            i += 1;
            continue;
        }

        let text = line.trim();
        let next = lines.get(i + 1);

        if let Some(underline) = next {
            if !text.is_empty() && SETEXT_H1.is_match(underline) {
                let slug = slugs.allocate(text);
                out.push(format!("# {} {{#{}}}", text, slug));
                i += 2;
                continue;
            }

            // A `---` after a blank line is a horizontal rule, not an underline
            let prev_blank = i == 0 || lines[i - 1].trim().is_empty();
            if !text.is_empty()
                && !prev_blank
                && text.chars().count() <= 100
                && SETEXT_H2.is_match(underline)
            {
                let slug = slugs.allocate(text);
                out.push(format!("## {} {{#{}}}", text, slug));
                i += 2;
                continue;
            }
        }

        let prev_blank = i == 0 || is_blank(lines.get(i - 1));
        let next_blank = is_blank(next);
        if prev_blank && next_blank && !text.is_empty() && looks_like_heading(line) {
            let num_level = numeric_heading_level(line);
            let level = if num_level > 0 { (1 + num_level).min(6) } else { 2 };
            let heading_text = NUMBERED_PREFIX.replace(line, "").trim().to_string();
            let slug = slugs.allocate(&heading_text);
            out.push(format!("{} {} {{#{}}}", "#".repeat(level), heading_text, slug));
            i += 1;
            continue;
        }

        out.push(line.clone());
        i += 1;
    }

    join_lines(&out, trailing_newline)
}

/// Drop `{#id}` / `{id}` tokens that ended up outside headings
///
/// Heading anchors are kept and normalized to a single space before `{#`.
/// Setext pairs pass through untouched.
pub fn sanitize_attr_tokens(md: &str) -> String {
    let (lines, trailing_newline) = split_lines(md);
    let mut out = Vec::with_capacity(lines.len());
    let mut in_code = false;
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];

        if FENCE.is_match(line) {
            in_code = !in_code;
            out.push(line.clone());
            i += 1;
            continue;
        }
        if in_code {
            out.push(line.clone());
            i += 1;
            continue;
        }

        if HEADING_WITH_ATTR.is_match(line) {
            let cleaned = TRAILING_ATTR.replace(line, " {#$1}");
            out.push(cleaned.trim_end().to_string());
            i += 1;
            continue;
        }

        if lines.get(i + 1).is_some_and(|next| SETEXT_ANY.is_match(next)) {
            out.push(line.clone());
            out.push(lines[i + 1].clone());
            i += 2;
            continue;
        }

        out.push(STRAY_ATTR.replace_all(line, "").into_owned());
        i += 1;
    }

    join_lines(&out, trailing_newline)
}

#[derive(Debug)]
struct TocNode {
    level: usize,
    text: String,
    anchor: String,
    number: String,
    children: Vec<TocNode>,
}

fn toc_display_text(raw: &str) -> String {
    let text = TRAILING_ATTR.replace(raw, "");
    let text = TOC_NUMBER_PREFIX.replace(text.trim(), "");
    let text = BOLD_STARS.replace_all(&text, "$1");
    let text = BOLD_UNDERSCORES.replace_all(&text, "$1");
    let text = ITALIC_STAR.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = STRIKETHROUGH.replace_all(&text, "$1");
    text.trim().to_string()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Nest flat (level, node) pairs under the closest shallower heading
fn build_toc_tree(flat: Vec<TocNode>) -> Vec<TocNode> {
    // Each stack entry is a node whose children are still being collected
    let mut stack: Vec<TocNode> = Vec::new();
    let mut roots = Vec::new();

    for node in flat {
        while stack.last().is_some_and(|top| top.level >= node.level) {
            if let Some(done) = stack.pop() {
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => roots.push(done),
                }
            }
        }
        stack.push(node);
    }
    while let Some(done) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
    roots
}

fn assign_numbers(nodes: &mut [TocNode], parent: &str) {
    for (index, node) in nodes.iter_mut().enumerate() {
        node.number = if parent.is_empty() {
            (index + 1).to_string()
        } else {
            format!("{}.{}", parent, index + 1)
        };
        let number = node.number.clone();
        assign_numbers(&mut node.children, &number);
    }
}

fn render_toc_items(nodes: &[TocNode], depth: usize, rows: &mut Vec<String>) {
    if nodes.is_empty() {
        return;
    }
    rows.push(format!(r#"<ol class="toc-ol toc-depth-{}">"#, depth));
    for node in nodes {
        let has_children = !node.children.is_empty();
        let toggle = if has_children {
            r#"<button class="toc-toggle" aria-expanded="true" title="Collapse section"></button>"#
        } else {
            ""
        };
        let mut item_class = if depth > 0 {
            format!("toc-item toc-l{}", node.level)
        } else {
            "toc-item toc-section".to_string()
        };
        if has_children {
            item_class.push_str(" toc-collapsible");
        }
        rows.push(format!(
            r##"<li class="{}"><span class="toc-num">{}</span><span class="toc-main">{}<a href="#{}" class="toc-link">{}</a></span>"##,
            item_class,
            node.number,
            toggle,
            node.anchor,
            escape_html(&node.text)
        ));
        render_toc_items(&node.children, depth + 1, rows);
        rows.push("</li>".to_string());
    }
    rows.push("</ol>".to_string());
}

/// Insert a numbered, nested table of contents
///
/// The TOC HTML is wrapped in [`TOC_PLACEHOLDER_START`] / [`TOC_PLACEHOLDER_END`]
/// so the renderer can lift it out before Markdown conversion. It goes right
/// after the first H1 when that heading is near the top, otherwise at the
/// very top. Documents without headings are returned unchanged.
pub fn build_toc(md: &str) -> String {
    let (mut lines, trailing_newline) = split_lines(md);
    let mut headings: Vec<(usize, String, usize)> = Vec::new();
    let mut first_h1 = None;
    let mut in_code = false;

    for (idx, line) in lines.iter().enumerate() {
        if FENCE.is_match(line) {
            in_code = !in_code;
            continue;
        }
        if in_code {
            continue;
        }
        if let Some(caps) = ANY_HEADING.captures(line) {
            let level = caps[1].len();
            headings.push((level, caps[2].trim().to_string(), idx));
            if level == 1 && first_h1.is_none() {
                first_h1 = Some(idx);
            }
        }
    }

    if headings.is_empty() {
        return md.to_string();
    }

    let mut flat = Vec::new();
    for (level, text, idx) in &headings {
        let existing = TRAILING_ATTR
            .captures(&lines[*idx])
            .map(|caps| caps[1].to_string());
        let anchor = match existing {
            Some(anchor) => anchor,
            None => {
                let anchor = slugify(text);
                lines[*idx] = format!("{} {} {{#{}}}", "#".repeat(*level), text, anchor);
                anchor
            }
        };
        let display = toc_display_text(text);
        if display.is_empty() {
            continue;
        }
        flat.push(TocNode {
            level: *level,
            text: display,
            anchor,
            number: String::new(),
            children: Vec::new(),
        });
    }

    let mut tree = build_toc_tree(flat);
    assign_numbers(&mut tree, "");

    let mut rows = vec![
        r#"<div class="generated-toc" role="navigation" aria-label="Table of contents">"#
            .to_string(),
        r#"<div class="toc-title">Contents</div>"#.to_string(),
        r#"<div class="toc-list">"#.to_string(),
    ];
    render_toc_items(&tree, 0, &mut rows);
    rows.push("</div>".to_string());
    rows.push("</div>".to_string());

    let mut insert_at = 0;
    if let Some(h1) = first_h1.filter(|&idx| idx < TOC_H1_WINDOW) {
        insert_at = h1 + 1;
        while insert_at < lines.len() && lines[insert_at].trim().is_empty() {
            insert_at += 1;
        }
    }

    let placeholder = format!(
        "{}{}{}",
        TOC_PLACEHOLDER_START,
        rows.join("\n"),
        TOC_PLACEHOLDER_END
    );
    lines.splice(insert_at..insert_at, [placeholder, String::new()]);
    join_lines(&lines, trailing_newline)
}

/// Classification of a fenced block, written as `<!-- dv:block=... -->`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    CodeOnly,
    CandidateSip,
    CandidateTopology,
    CandidateFlowchart,
    CodeBlock,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::CodeOnly => "code-only",
            BlockKind::CandidateSip => "candidate-sip",
            BlockKind::CandidateTopology => "candidate-topology",
            BlockKind::CandidateFlowchart => "candidate-flowchart",
            BlockKind::CodeBlock => "code-block",
        }
    }

    /// The comment inserted in front of a block of this kind
    pub fn marker(self) -> String {
        format!("<!-- dv:block={} -->", self.as_str())
    }
}

/// Heuristic for C-like program text
///
/// `++` / `--` only count when attached to an identifier, so ASCII box
/// borders like `+-----+` are not mistaken for code.
pub(crate) fn looks_like_program_code(text: &str) -> bool {
    PROGRAM_TOKEN.find_iter(text).count() >= 3
}

pub(crate) fn has_topology(text: &str) -> bool {
    const BOX_CHARS: &[char] = &['┌', '─', '┐', '│', '└', '┘'];
    (text.contains("+---") || text.contains(BOX_CHARS)) && !text.contains("->")
}

pub(crate) fn has_sip_markers(text: &str) -> bool {
    let arrows = text.matches("->").count() + text.matches("=>").count();
    arrows >= 2 && (SIP_METHOD.is_match(text) || SIP_RESPONSE_CODE.is_match(text))
}

fn has_flowchart(text: &str) -> bool {
    FLOW_EDGE.find_iter(text).count() >= 2
}

/// Classify the body of a fenced block
pub fn classify_block(body: &str) -> BlockKind {
    if looks_like_program_code(body) {
        BlockKind::CodeOnly
    } else if has_sip_markers(body) {
        BlockKind::CandidateSip
    } else if has_topology(body) {
        BlockKind::CandidateTopology
    } else if has_flowchart(body) {
        BlockKind::CandidateFlowchart
    } else {
        BlockKind::CodeBlock
    }
}

/// Prefix every fenced block with a `<!-- dv:block=... -->` classification marker
pub fn annotate_blocks(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    let mut last = 0;

    for caps in FENCED_BLOCK.captures_iter(md) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.name("body")) else {
            continue;
        };
        out.push_str(&md[last..whole.start()]);
        out.push_str(&classify_block(body.as_str()).marker());
        out.push('\n');
        out.push_str(whole.as_str());
        last = whole.end();
    }

    out.push_str(&md[last..]);
    out
}
