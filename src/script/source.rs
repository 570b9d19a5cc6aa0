//! Source excerpts for script failures.

/// Lines shown before and after the failing line.
pub const CONTEXT_LINES: usize = 2;

/// Render `line` (1-based) of `source` with surrounding context.
///
/// ```text
///    3 | let posts = data_files("posts/*.md");
///  > 4 | reject("no posts");
///    5 | resolve();
/// ```
///
/// Returns an empty string when the line is out of range.
pub fn excerpt(source: &str, line: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if line == 0 || line > lines.len() {
        return String::new();
    }

    let first = line.saturating_sub(CONTEXT_LINES).max(1);
    let last = (line + CONTEXT_LINES).min(lines.len());
    let width = last.to_string().len();

    (first..=last)
        .map(|n| {
            let marker = if n == line { '>' } else { ' ' };
            format!(" {marker} {n:>width$} | {}", lines[n - 1])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Excerpt prefixed with a newline, ready to append to an error message.
pub fn context(source: &str, line: Option<usize>) -> String {
    match line.map(|line| excerpt(source, line)) {
        Some(text) if !text.is_empty() => format!("\n{text}"),
        _ => String::new(),
    }
}
