// logdex - core/textformat.rs
//
// A lightweight heuristic used when no registered format has locked in
// after the unmatched-line cap is reached: decide whether the remaining
// bytes still look like line-oriented text (worth continuing to index as
// an undifferentiated stream of continuation lines) or look like binary
// data that was merely handed to the indexer by mistake.

/// Result of sampling a file's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// An XML or XML-like document (starts with a `<?xml` declaration or is
    /// dominated by angle-bracket markup).
    Xml,
    /// A Markdown document (headers, fenced code blocks, or list bullets
    /// make up a noticeable share of the sampled lines).
    Markdown,
    /// Bytes decode as (mostly) printable text that doesn't match a more
    /// specific structured format.
    PlainText,
    /// A significant fraction of bytes are NUL or otherwise non-printable
    /// control characters; this is very unlikely to be a log file.
    Binary,
}

/// Fraction of non-printable bytes (excluding `\t`, `\n`, `\r`) above which
/// a sample is classified as binary.
const BINARY_CONTROL_RATIO_THRESHOLD: f64 = 0.05;

/// Fraction of sampled lines carrying a Markdown marker (`#` heading, `*`/`-`
/// bullet, or fenced code block) above which a sample is classified as
/// Markdown.
const MARKDOWN_LINE_RATIO_THRESHOLD: f64 = 0.1;

/// Classify a sample of a file's content.
///
/// `sample` should be the first chunk of the file (a few KB is enough);
/// this never reads beyond what's passed in.
pub fn detect_text_format(sample: &[u8]) -> TextFormat {
    if sample.is_empty() {
        return TextFormat::PlainText;
    }

    if sample.contains(&0u8) {
        return TextFormat::Binary;
    }

    let control_bytes = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
        .count();

    let ratio = control_bytes as f64 / sample.len() as f64;
    if ratio > BINARY_CONTROL_RATIO_THRESHOLD {
        return TextFormat::Binary;
    }

    // `from_utf8_lossy` never panics, and a log profile's byte offsets are
    // still valid against `sample` regardless of which branch below fires -
    // classification never reinterprets or rewrites the bytes.
    let text = String::from_utf8_lossy(sample);
    let trimmed = text.trim_start();

    if trimmed.starts_with("<?xml") || looks_like_markup(trimmed) {
        return TextFormat::Xml;
    }

    if looks_like_markdown(&text) {
        return TextFormat::Markdown;
    }

    TextFormat::PlainText
}

/// A crude markup sniff: the sample opens with a tag and angle brackets make
/// up a large share of non-whitespace characters.
fn looks_like_markup(trimmed: &str) -> bool {
    if !trimmed.starts_with('<') {
        return false;
    }

    let non_ws = trimmed.chars().filter(|c| !c.is_whitespace()).count();
    if non_ws == 0 {
        return false;
    }

    let angle_brackets = trimmed.chars().filter(|&c| c == '<' || c == '>').count();
    (angle_brackets as f64 / non_ws as f64) > 0.08
}

/// A crude Markdown sniff: count lines opening with an ATX heading, a list
/// bullet, or a fenced code block, and compare against the total line count.
fn looks_like_markdown(text: &str) -> bool {
    let mut lines = 0usize;
    let mut markers = 0usize;

    for line in text.lines() {
        lines += 1;
        let trimmed = line.trim_start();
        if trimmed.starts_with('#')
            || trimmed.starts_with("```")
            || trimmed.starts_with("- ")
            || trimmed.starts_with("* ")
            || trimmed.starts_with("> ")
        {
            markers += 1;
        }
    }

    if lines == 0 {
        return false;
    }

    (markers as f64 / lines as f64) > MARKDOWN_LINE_RATIO_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_log_lines_classify_as_text() {
        let sample = b"2024-01-15 12:00:00 INFO starting up\n2024-01-15 12:00:01 INFO ready\n";
        assert_eq!(detect_text_format(sample), TextFormat::PlainText);
    }

    #[test]
    fn nul_bytes_classify_as_binary() {
        let sample = [0x00, 0x01, 0x02, b'a', b'b', b'c'];
        assert_eq!(detect_text_format(&sample), TextFormat::Binary);
    }

    #[test]
    fn empty_sample_classifies_as_text() {
        assert_eq!(detect_text_format(&[]), TextFormat::PlainText);
    }

    #[test]
    fn sparse_control_bytes_still_classify_as_text() {
        let mut sample = vec![b'a'; 200];
        sample.push(0x01);
        assert_eq!(detect_text_format(&sample), TextFormat::PlainText);
    }

    #[test]
    fn xml_declaration_classifies_as_xml() {
        let sample = b"<?xml version=\"1.0\"?>\n<log><entry>boot</entry></log>\n";
        assert_eq!(detect_text_format(sample), TextFormat::Xml);
    }

    #[test]
    fn tag_heavy_markup_without_declaration_classifies_as_xml() {
        let sample = b"<log><entry level=\"info\">starting up</entry><entry>ready</entry></log>";
        assert_eq!(detect_text_format(sample), TextFormat::Xml);
    }

    #[test]
    fn headings_and_bullets_classify_as_markdown() {
        let sample = b"# Release notes\n\n- fixed a bug\n- improved startup time\n\nSee changelog for details.\n";
        assert_eq!(detect_text_format(sample), TextFormat::Markdown);
    }

    #[test]
    fn fenced_code_block_classifies_as_markdown() {
        let sample = b"# Example\n```\nfn main() {}\n```\n";
        assert_eq!(detect_text_format(sample), TextFormat::Markdown);
    }

    #[test]
    fn occasional_hash_or_dash_does_not_trigger_markdown() {
        let sample = b"2024-01-15 12:00:00 INFO request #42 - done\n2024-01-15 12:00:01 INFO ready\n";
        assert_eq!(detect_text_format(sample), TextFormat::PlainText);
    }
}
