//! Shared text-cleaning stage. Every extractor funnels its raw text through `clean_text`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::models::DocumentFormat;

/// `word-\nbreak` left behind by PDF line wrapping.
static HYPHENATED_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z])-[ \t]*\n[ \t]*([a-z])").expect("valid regex"));

/// Cleans extracted text:
/// 1. line endings become `\n`
/// 2. typographic quotes, dashes, bullets and invisible spaces are normalized
/// 3. (PDF only) hyphenated line-break splits are rejoined
/// 4. runs of whitespace inside a line collapse to one space, lines are trimmed
/// 5. at most one blank line is kept between paragraphs
pub fn clean_text(raw: &str, format: DocumentFormat) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut text = normalize_typography(&text);

    if format == DocumentFormat::Pdf {
        text = rejoin_hyphenated(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            pending_blank = true;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if pending_blank {
                out.push('\n');
            }
        }
        out.push_str(&collapsed);
        pending_blank = false;
    }

    out
}

/// A match consumes the letter after the break, so `x-\ny-\nz` needs a second pass.
fn rejoin_hyphenated(mut text: String) -> String {
    while HYPHENATED_BREAK.is_match(&text) {
        text = HYPHENATED_BREAK.replace_all(&text, "${1}${2}").into_owned();
    }
    text
}

fn normalize_typography(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => out.push('"'),
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => out.push('-'),
            '\u{2022}' | '\u{2023}' | '\u{2043}' | '\u{25AA}' | '\u{25AB}' | '\u{25CF}'
            | '\u{25CB}' | '\u{25A0}' | '\u{25A1}' | '\u{25BA}' | '\u{25B8}' | '\u{25E6}'
            | '\u{27A2}' | '\u{2714}' | '\u{2713}' | '\u{F0B7}' => out.push_str("- "),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' | '\u{2007}' | '\u{2009}' | '\u{200A}' | '\u{202F}' | '\t' => out.push(' '),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{00AD}' => {}
            // page breaks from PDF extraction
            '\u{000C}' => out.push('\n'),
            _ => out.push(c),
        }
    }
    out
}
