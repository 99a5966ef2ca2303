//! Splits reply text into prose and fenced code blocks for rendering.

use regex::Regex;
use std::sync::OnceLock;

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Code {
        language: Option<&'a str>,
        code: String,
    },
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```.*?```").expect("fence pattern is valid"))
}

/// Splits `content` on closed ``` fences.
///
/// An unclosed fence, as seen while a reply is still streaming, stays text.
pub fn split_code_blocks(content: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for fenced in fence_pattern().find_iter(content) {
        push_text(&mut segments, &content[cursor..fenced.start()]);
        segments.push(parse_fenced(fenced.as_str()));
        cursor = fenced.end();
    }
    push_text(&mut segments, &content[cursor..]);

    segments
}

fn push_text<'a>(segments: &mut Vec<Segment<'a>>, text: &'a str) {
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
}

fn parse_fenced(block: &str) -> Segment<'_> {
    let inner = &block[FENCE.len()..block.len() - FENCE.len()];

    // ```x``` on one line is code `x`, not a language tag over an empty block.
    let Some((first_line, rest)) = inner.split_once('\n') else {
        return Segment::Code {
            language: None,
            code: inner.to_string(),
        };
    };

    let language = Some(first_line.trim()).filter(|lang| !lang.is_empty());

    // The closing fence's line is dropped along with the opening one.
    let code = match rest.rfind('\n') {
        Some(pos) => rest[..pos].to_string(),
        None => String::new(),
    };

    Segment::Code { language, code }
}
