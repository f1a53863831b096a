/// A run of text with uniform inline formatting
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextSpan {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
}

impl TextSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

struct Markup {
    open: &'static str,
    close: &'static str,
    bold: bool,
    italic: bool,
    strikethrough: bool,
    underline: bool,
}

impl Markup {
    const fn new(open: &'static str, close: &'static str) -> Self {
        Self {
            open,
            close,
            bold: false,
            italic: false,
            strikethrough: false,
            underline: false,
        }
    }
}

// Longer delimiters first, so `***` wins over `**` and `*` at the same offset
const MARKUP: [Markup; 5] = [
    Markup {
        bold: true,
        italic: true,
        ..Markup::new("***", "***")
    },
    Markup {
        bold: true,
        ..Markup::new("**", "**")
    },
    Markup {
        italic: true,
        ..Markup::new("*", "*")
    },
    Markup {
        strikethrough: true,
        ..Markup::new("~~", "~~")
    },
    Markup {
        underline: true,
        ..Markup::new("<u>", "</u>")
    },
];

struct Match<'a> {
    start: usize,
    end: usize,
    inner: &'a str,
    markup: &'a Markup,
}

/// Split `text` into formatted spans.
///
/// Supports `***bold italic***`, `**bold**`, `*italic*`, `~~strikethrough~~` and
/// `<u>underline</u>`. The earliest match wins and overlapping matches are dropped.
/// Formatted content never spans a newline. Empty input yields no spans.
pub fn parse_formatted_text(text: &str) -> Vec<TextSpan> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<Match<'_>> = MARKUP.iter().flat_map(|markup| find_all(text, markup)).collect();
    // Stable, so at equal offsets the longer delimiter stays first
    matches.sort_by_key(|m| m.start);

    let mut accepted: Vec<Match<'_>> = Vec::new();
    for candidate in matches {
        let overlaps = accepted
            .iter()
            .any(|m| candidate.start < m.end && m.start < candidate.end);
        if !overlaps {
            accepted.push(candidate);
        }
    }

    let mut spans = Vec::new();
    let mut last = 0;
    for m in accepted {
        if m.start > last {
            spans.push(TextSpan::plain(&text[last..m.start]));
        }
        spans.push(TextSpan {
            text: m.inner.to_owned(),
            bold: m.markup.bold,
            italic: m.markup.italic,
            strikethrough: m.markup.strikethrough,
            underline: m.markup.underline,
        });
        last = m.end;
    }
    if last < text.len() {
        spans.push(TextSpan::plain(&text[last..]));
    }

    if spans.is_empty() {
        spans.push(TextSpan::plain(text));
    }
    spans
}

/// Non-overlapping, shortest matches of one markup, scanning left to right
fn find_all<'a>(text: &'a str, markup: &'a Markup) -> Vec<Match<'a>> {
    let mut found = Vec::new();
    let mut from = 0;

    while let Some(offset) = text[from..].find(markup.open) {
        let start = from + offset;
        match close_of(text, start + markup.open.len(), markup.close) {
            Some(close) => {
                let end = close + markup.close.len();
                found.push(Match {
                    start,
                    end,
                    inner: &text[start + markup.open.len()..close],
                    markup,
                });
                from = end;
            }
            None => {
                // Retry one character further, like a regex scan would
                from = start + text[start..].chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    found
}

/// Offset of the first `close` after at least one non-newline character
fn close_of(text: &str, content_start: usize, close: &str) -> Option<usize> {
    let mut chars = text[content_start..].char_indices();
    let (_, first) = chars.next()?;
    if first == '\n' {
        return None;
    }

    for (offset, c) in chars {
        let position = content_start + offset;
        if text[position..].starts_with(close) {
            return Some(position);
        }
        if c == '\n' {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn styled(text: &str, bold: bool, italic: bool) -> TextSpan {
        TextSpan {
            text: text.to_owned(),
            bold,
            italic,
            ..TextSpan::default()
        }
    }

    #[test]
    fn test_empty_and_plain() {
        assert!(parse_formatted_text("").is_empty());
        assert_eq!(parse_formatted_text("just text"), vec![TextSpan::plain("just text")]);
    }

    #[test]
    fn test_bold_italic_precedence() {
        assert_eq!(
            parse_formatted_text("***b*** and *d*"),
            vec![
                styled("b", true, true),
                TextSpan::plain(" and "),
                styled("d", false, true),
            ]
        );
        assert_eq!(
            parse_formatted_text("x **c** y"),
            vec![TextSpan::plain("x "), styled("c", true, false), TextSpan::plain(" y")]
        );
    }

    #[test]
    fn test_underline_and_strikethrough() {
        let spans = parse_formatted_text("<u>under</u> and ~~gone~~");
        assert_eq!(spans.len(), 3);
        assert!(spans[0].underline);
        assert_eq!(spans[0].text, "under");
        assert!(spans[2].strikethrough);
        assert_eq!(spans[2].text, "gone");
    }

    #[test]
    fn test_markup_does_not_cross_newlines() {
        assert_eq!(parse_formatted_text("*a\nb*"), vec![TextSpan::plain("*a\nb*")]);
    }

    #[test]
    fn test_unclosed_markup_is_plain() {
        assert_eq!(parse_formatted_text("2 * 3"), vec![TextSpan::plain("2 * 3")]);
        assert_eq!(parse_formatted_text("**"), vec![TextSpan::plain("**")]);
    }
}
