//! Smart conversions
//!
//! Experimental passes that turn loosely formatted text into richer Markdown:
//! space-aligned tables, SIP call flows and ASCII network topologies.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::standard::{
    has_sip_markers, has_topology, looks_like_program_code, BlockKind, FENCED_BLOCK,
    SIP_METHOD, SIP_RESPONSE_CODE,
};

/// How many lines above a block are searched for its section heading
const HEADING_LOOKBACK: usize = 12;

const MIN_PARTICIPANTS: usize = 2;
const MAX_PARTICIPANTS: usize = 8;
const MAX_TOPOLOGY_NODES: usize = 8;

const PROGRAMMING_LANGS: &[&str] = &[
    "c", "cpp", "c++", "java", "go", "rust", "js", "ts", "javascript", "typescript", "python",
    "py", "json", "xml",
];

const SIGNALING_KEYWORDS: &[&str] = &[
    "sip", "signaling", "signal", "sequence", "call flow", "message flow", "flow",
];

lazy_static! {
    static ref ALIGNED_COLUMNS: Regex = Regex::new(r"\S\s{2,}\S").unwrap();
    static ref COLUMN_GAP: Regex = Regex::new(r"\s{2,}").unwrap();
    static ref SIP_EDGE: Regex = Regex::new(
        r"^\s*([A-Za-z0-9_.-]{2,})\s*(?:->|=>)\s*([A-Za-z0-9_.-]{2,})\s*:?\s*(.*)"
    )
    .unwrap();
    static ref TOPOLOGY_NODE: Regex = Regex::new(r"[A-Za-z0-9_]{3,}").unwrap();
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// A line that can open a space-aligned table
fn is_table_header(line: &str) -> bool {
    let starts_plain = !line.starts_with('\t') && !line.starts_with("    ");
    let trimmed = line.trim_start();
    starts_plain
        && !trimmed.starts_with('#')
        && !trimmed.starts_with('|')
        && !trimmed.starts_with('<')
        && ALIGNED_COLUMNS.is_match(line)
}

fn table_row(cells: &[&str]) -> String {
    format!("| {} |", cells.join(" | "))
}

/// Rewrite runs of space-aligned lines as Markdown pipe tables
///
/// A block starts at a line with at least two columns separated by two or
/// more spaces and runs until a blank line, a heading, an HTML line or a fence. The first
/// line becomes the header row. Fenced code blocks are left alone.
pub fn convert_ascii_tables(md: &str) -> String {
    let lines: Vec<&str> = md.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut in_code = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if is_fence(line) {
            in_code = !in_code;
            out.push(line.to_string());
            i += 1;
            continue;
        }
        if in_code || !is_table_header(line) {
            out.push(line.to_string());
            i += 1;
            continue;
        }

        let mut block = vec![line];
        let mut j = i + 1;
        while j < lines.len() {
            let next = lines[j];
            let trimmed = next.trim_start();
            if trimmed.is_empty()
                || trimmed.starts_with('#')
                || trimmed.starts_with('<')
                || is_fence(next)
            {
                break;
            }
            block.push(next);
            j += 1;
        }

        let header: Vec<&str> = COLUMN_GAP.split(block[0].trim()).collect();
        if header.len() < 2 {
            out.push(line.to_string());
            i += 1;
            continue;
        }

        out.push(table_row(&header));
        out.push(table_row(&vec!["---"; header.len()]));
        for row in &block[1..] {
            let cells: Vec<&str> = COLUMN_GAP.split(row.trim()).collect();
            out.push(table_row(&cells));
        }
        i = j;
    }

    let mut result = out.join("\n");
    if md.ends_with('\n') {
        result.push('\n');
    }
    result
}

/// Whether the block starting at `start` carries the given classification marker
///
/// Only the last non-blank line above the fence counts, so a neighbouring
/// block's marker never applies.
fn has_marker(md: &str, start: usize, kind: BlockKind) -> bool {
    md[..start]
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.trim() == kind.marker())
}

/// Nearest heading above `start`, lowercased
fn heading_before(md: &str, start: usize) -> Option<String> {
    md[..start]
        .lines()
        .rev()
        .take(HEADING_LOOKBACK)
        .find(|line| line.trim_start().starts_with('#'))
        .map(|line| line.trim().to_lowercase())
}

fn has_signaling_context(heading: Option<&str>) -> bool {
    heading.is_some_and(|h| SIGNALING_KEYWORDS.iter().any(|k| h.contains(k)))
}

/// Participants and `(from, to, message)` edges of a call flow body
fn parse_call_flow(body: &str) -> (Vec<String>, Vec<(String, String, String)>) {
    let mut participants: Vec<String> = Vec::new();
    let mut edges = Vec::new();

    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        if let Some(caps) = SIP_EDGE.captures(line) {
            let from = caps[1].to_string();
            let to = caps[2].to_string();
            for name in [&from, &to] {
                if !participants.contains(name) {
                    participants.push(name.clone());
                }
            }
            edges.push((from, to, caps[3].trim().to_string()));
        }
    }

    (participants, edges)
}

fn sequence_diagram(participants: &[String], edges: &[(String, String, String)]) -> String {
    let mut lines = vec!["```mermaid".to_string(), "sequenceDiagram".to_string()];
    lines.extend(participants.iter().map(|p| format!("participant {}", p)));
    lines.extend(
        edges
            .iter()
            .map(|(from, to, msg)| format!("{}->>{}: {}", from, to, msg)),
    );
    lines.push("```".to_string());
    lines.join("\n")
}

/// Mermaid replacement for one fenced block, if it reads as a SIP call flow
fn sip_block_to_mermaid(md: &str, caps: &Captures) -> Option<String> {
    let whole = caps.get(0)?;
    let lang = caps.name("lang").map_or("", |m| m.as_str()).trim().to_lowercase();
    let body = caps.name("body")?.as_str();

    if PROGRAMMING_LANGS.contains(&lang.as_str()) {
        return None;
    }
    if has_marker(md, whole.start(), BlockKind::CodeOnly) {
        return None;
    }
    if !has_marker(md, whole.start(), BlockKind::CandidateSip)
        && !has_signaling_context(heading_before(md, whole.start()).as_deref())
    {
        return None;
    }
    if looks_like_program_code(body) || !has_sip_markers(body) {
        return None;
    }

    let has_sip_message = body
        .lines()
        .any(|l| SIP_METHOD.is_match(l) || SIP_RESPONSE_CODE.is_match(l));
    if !has_sip_message {
        return None;
    }

    let (participants, edges) = parse_call_flow(body);
    if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&participants.len()) {
        return None;
    }

    Some(sequence_diagram(&participants, &edges))
}

/// Replace each fenced block for which `convert` yields something
fn rewrite_fenced_blocks<F>(md: &str, mut convert: F) -> String
where
    F: FnMut(&Captures) -> Option<String>,
{
    let mut out = String::with_capacity(md.len());
    let mut last = 0;

    for caps in FENCED_BLOCK.captures_iter(md) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&md[last..whole.start()]);
        match convert(&caps) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }

    out.push_str(&md[last..]);
    out
}

/// Turn fenced SIP signaling traces into Mermaid sequence diagrams
///
/// A block converts only when all of the following hold:
/// - it is not tagged with a programming language and not marked code-only
/// - it is marked as a SIP candidate, or its section heading mentions signaling
/// - it has at least two arrows and a SIP method or response code
/// - it names between two and eight participants
pub fn convert_sip_signaling(md: &str) -> String {
    rewrite_fenced_blocks(md, |caps| sip_block_to_mermaid(md, caps))
}

/// Mermaid replacement for one fenced block, if it draws an ASCII topology
fn topology_block_to_mermaid(md: &str, caps: &Captures) -> Option<String> {
    let whole = caps.get(0)?;
    let lang = caps.name("lang").map_or("", |m| m.as_str()).trim().to_lowercase();
    let body = caps.name("body")?.as_str();

    let plain_lang = matches!(lang.as_str(), "" | "text" | "ascii" | "diagram");
    let marked = has_marker(md, whole.start(), BlockKind::CandidateTopology);
    if !(marked || plain_lang) || !has_topology(body) || looks_like_program_code(body) {
        return None;
    }

    let mut nodes: Vec<&str> = Vec::new();
    for word in TOPOLOGY_NODE.find_iter(body).map(|m| m.as_str()) {
        if nodes.len() == MAX_TOPOLOGY_NODES {
            break;
        }
        if !nodes.contains(&word) {
            nodes.push(word);
        }
    }
    if nodes.len() < 2 {
        return None;
    }

    let mut lines = vec!["```mermaid".to_string(), "flowchart LR".to_string()];
    lines.extend(nodes.iter().map(|n| format!("    {}[{}]", n, n)));
    lines.push("```".to_string());
    Some(lines.join("\n"))
}

/// Turn fenced ASCII box drawings into Mermaid flowcharts listing their nodes
pub fn convert_topology(md: &str) -> String {
    rewrite_fenced_blocks(md, |caps| topology_block_to_mermaid(md, caps))
}
