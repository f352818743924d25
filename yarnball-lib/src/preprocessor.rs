//! Strips the decoration a pattern file may carry around its instructions.
//!
//! A file may start with free text (title, materials, notes) followed by a `STITCH GUIDE:` or
//! `INSTRUCTIONS:` header. Everything up to the first header is prose. Lines that are dropped
//! become empty lines, so line numbers in later error messages still point into the file.

use crate::lexer::row_label_len;

const HEADERS: [&str; 2] = ["STITCH GUIDE:", "INSTRUCTIONS:"];

fn is_header(line: &str) -> bool {
    HEADERS.iter().any(|h| line.eq_ignore_ascii_case(h))
}

pub fn preprocess(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let start = lines
        .iter()
        .position(|l| is_header(l.trim()))
        .map_or(0, |i| i + 1);
    log::debug!("preprocessing, instructions start on line {}", start + 1);

    let mut out = vec![""; start];
    out.extend(lines[start..].iter().map(|line| clean_line(line)));
    out.join("\n")
}

fn clean_line(line: &str) -> &str {
    let line = line.trim();
    if line.starts_with('#') || is_header(line) {
        return "";
    }
    let line = match line.find('#') {
        Some(idx) => line[..idx].trim_end(),
        None => line,
    };
    match row_label_len(line) {
        Some(len) => &line[len..],
        None => line,
    }
}
