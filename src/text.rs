use crate::error::{CifError, ErrorCode, ErrorSink, SyntaxError};
use crate::options::Protocols;

/// The fold point is preferably a whitespace boundary within this many
/// code points of the target line length.
const FOLD_WINDOW: usize = 6;

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Protocols signalled by the first line of a text block, with the
/// declared prefix.
fn sniff_header(first: &str, enabled: Protocols) -> Option<(Protocols, String)> {
    let trimmed = first.trim_end_matches(is_blank);
    let stripped = trimmed.strip_suffix('\\')?;
    if stripped.is_empty() {
        // A lone backslash: folding only.
        return enabled
            .contains(Protocols::FOLD)
            .then(|| (Protocols::FOLD, String::new()));
    }
    let (prefix, fold) = match stripped.strip_suffix('\\') {
        Some(prefix) => (prefix, true),
        None => (stripped, false),
    };
    if prefix.contains('\\') {
        return None;
    }
    if prefix.is_empty() {
        // Two backslashes and no prefix: folding only.
        return enabled
            .contains(Protocols::FOLD)
            .then(|| (Protocols::FOLD, String::new()));
    }
    let mut active = Protocols::empty();
    if enabled.contains(Protocols::PREFIX) {
        active |= Protocols::PREFIX;
    }
    if fold && enabled.contains(Protocols::FOLD) {
        active |= Protocols::FOLD;
    }
    if active.is_empty() {
        return None;
    }
    let prefix = if active.contains(Protocols::PREFIX) {
        prefix.to_string()
    } else {
        String::new()
    };
    Some((active, prefix))
}

/// Decode the raw content of a text block, applying whichever of the
/// line-folding and prefix protocols its first line declares (and the
/// caller has enabled).
///
/// `base_line` is the source line of the opening `;`; it positions any
/// `MissingPrefix` reports.
pub(crate) fn decode_text_block(
    raw: &str,
    enabled: Protocols,
    base_line: u32,
    sink: &mut impl ErrorSink,
) -> Result<String, CifError> {
    let mut lines: Vec<&str> = raw.split('\n').collect();
    let mut active = Protocols::empty();
    let mut prefix = String::new();
    let mut first_content_line = 0u32;
    if let Some(first) = lines.first() {
        if let Some((protocols, declared)) = sniff_header(first, enabled) {
            active = protocols;
            prefix = declared;
            lines.remove(0);
            first_content_line = 1;
        }
    }

    let fold = active.contains(Protocols::FOLD);
    let mut out = String::new();
    let last = lines.len().saturating_sub(1);
    for (index, &line) in lines.iter().enumerate() {
        let mut line = line;
        if !prefix.is_empty() {
            match line.strip_prefix(prefix.as_str()) {
                Some(rest) => line = rest,
                None => {
                    sink.report(SyntaxError {
                        code: ErrorCode::MissingPrefix,
                        line: base_line + first_content_line + index as u32,
                        column: 1,
                        text: line.to_string(),
                    })?;
                    // Recovery: accept the line unprefixed.
                }
            }
        }
        if fold {
            let trimmed = line.trim_end_matches(is_blank);
            if let Some(joined) = trimmed.strip_suffix('\\') {
                out.push_str(joined);
                continue;
            }
        }
        out.push_str(line);
        if index != last {
            out.push('\n');
        }
    }
    Ok(out)
}

/// Split one logical line into fold segments around `target`, breaking
/// for preference just after a whitespace character within the fold
/// window.
fn split_folded(line: &str, target: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let target = target.max(2);
    let mut segments = Vec::new();
    let mut start = 0;
    while chars.len() - start > target {
        let ideal = start + target;
        let lo = ideal.saturating_sub(FOLD_WINDOW).max(start + 1);
        let hi = (ideal + FOLD_WINDOW).min(chars.len() - 1);
        let cut = (lo..=hi)
            .rev()
            .find(|&i| is_blank(chars[i - 1]))
            .unwrap_or(ideal);
        segments.push(chars[start..cut].iter().collect());
        start = cut;
    }
    segments.push(chars[start..].iter().collect());
    segments
}

/// Encode `text` as the body of a text block, the inverse of
/// [`decode_text_block`]. The output starts at the opening `;` and ends
/// just after the closing `;`; the caller supplies surrounding line
/// breaks.
pub(crate) fn encode_text_block(
    text: &str,
    active: Protocols,
    prefix: &str,
    fold_width: usize,
) -> String {
    let fold = active.contains(Protocols::FOLD);
    let prefix = if active.contains(Protocols::PREFIX) {
        prefix
    } else {
        ""
    };
    let mut out = String::from(";");
    if fold || !prefix.is_empty() {
        out.push_str(prefix);
        out.push('\\');
        if fold && !prefix.is_empty() {
            out.push('\\');
        }
        out.push('\n');
    }
    // Reserve room for the prefix and the fold marker.
    let width = fold_width.saturating_sub(prefix.chars().count() + 1);
    for line in text.split('\n') {
        let mut segments = if fold {
            split_folded(line, width)
        } else {
            vec![line.to_string()]
        };
        // A content line reading as a fold join (backslash as its last
        // non-blank character) gets an extra break and an empty
        // continuation to protect it.
        if fold
            && segments
                .last()
                .is_some_and(|s| s.trim_end_matches(is_blank).ends_with('\\'))
        {
            segments.push(String::new());
        }
        let last = segments.len() - 1;
        for (index, segment) in segments.iter().enumerate() {
            out.push_str(prefix);
            out.push_str(segment);
            if index != last {
                out.push('\\');
            }
            out.push('\n');
        }
    }
    out.push(';');
    out
}
