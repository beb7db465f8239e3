//! Source position mapping
//!
//! The recognizer reports columns computed with a tab width of 8, while the
//! editor stores a flat character buffer with its own tab rendering. Both
//! sides must agree on the same absolute character position for
//! highlighting and breakpoint correlation, so recognizer coordinates are
//! mapped back through the raw line text.

use crate::protocol::Token;

/// Tab stop the recognizer assumes when computing character positions
pub const RECOGNIZER_TAB_STOP: u32 = 8;

/// One line of the source buffer: its absolute start offset and raw text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// Absolute character offset of the first character of the line
    pub offset: usize,
    /// Raw line text, without the trailing newline
    pub text: String,
}

/// Provider of the source buffer being recognized (the editor side)
pub trait SourceTextProvider: Send + Sync {
    /// Ordered lines of the buffer
    fn lines(&self) -> Vec<SourceLine>;
    /// Full flat buffer
    fn text(&self) -> String;
}

/// Owned source buffer, line-indexed on construction.
///
/// Offsets are character offsets, matching the flat character buffer the
/// mapper contract is defined over.
#[derive(Debug, Clone, Default)]
pub struct SourceText {
    text: String,
    lines: Vec<SourceLine>,
}

impl SourceText {
    pub fn new(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut offset = 0usize;
        let mut current = String::new();
        for ch in text.chars() {
            if ch == '\n' {
                let line_chars = current.chars().count();
                lines.push(SourceLine {
                    offset,
                    text: std::mem::take(&mut current),
                });
                offset += line_chars + 1;
            } else {
                current.push(ch);
            }
        }
        if !current.is_empty() {
            lines.push(SourceLine { offset, text: current });
        }
        Self {
            text: text.to_string(),
            lines,
        }
    }
}

impl SourceTextProvider for SourceText {
    fn lines(&self) -> Vec<SourceLine> {
        self.lines.clone()
    }

    fn text(&self) -> String {
        self.text.clone()
    }
}

/// Map a recognizer position to an absolute character offset.
///
/// `line` is 1-based as reported by the recognizer; `char_position` is the
/// recognizer column under [`RECOGNIZER_TAB_STOP`]. Walks the raw line
/// characters, advancing the column counter by 1 per character and snapping
/// to the next multiple of the tab stop per tab, consuming characters until
/// the counter passes the requested column. The result is the offset of the
/// character occupying that column. Returns `None` when the line is out of
/// range.
pub fn map_position(lines: &[SourceLine], line: u32, char_position: u32) -> Option<usize> {
    let line_index = (line as usize).checked_sub(1)?;
    let entry = lines.get(line_index)?;

    let mut column = 0u32;
    let mut consumed = 0usize;
    for ch in entry.text.chars() {
        if column > char_position {
            break;
        }
        if ch == '\t' {
            column = (column / RECOGNIZER_TAB_STOP + 1) * RECOGNIZER_TAB_STOP;
        } else {
            column += 1;
        }
        consumed += 1;
    }

    if consumed == 0 {
        return Some(entry.offset);
    }
    Some(entry.offset + consumed - 1)
}

/// Map a token's reported position to an absolute character offset
pub fn map_token(lines: &[SourceLine], token: &Token) -> Option<usize> {
    map_position(lines, token.line, token.char_position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<SourceLine> {
        SourceText::new(text).lines()
    }

    #[test]
    fn test_tab_column_maps_to_following_character() {
        // "a\tb": 'a' occupies column 0, the tab columns 1-7, 'b' column 8
        let lines = lines("a\tb\n");
        assert_eq!(map_position(&lines, 1, 8), Some(2));
    }

    #[test]
    fn test_column_inside_tab_maps_to_the_tab() {
        let lines = lines("a\tb\n");
        assert_eq!(map_position(&lines, 1, 1), Some(1));
        assert_eq!(map_position(&lines, 1, 7), Some(1));
    }

    #[test]
    fn test_column_zero() {
        let lines = lines("a\tb\n");
        assert_eq!(map_position(&lines, 1, 0), Some(0));
    }

    #[test]
    fn test_plain_line_without_tabs() {
        let lines = lines("grammar T;\nexpr : INT ;\n");
        // second line starts after "grammar T;\n" (11 characters)
        assert_eq!(map_position(&lines, 2, 0), Some(11));
        assert_eq!(map_position(&lines, 2, 5), Some(16));
    }

    #[test]
    fn test_line_out_of_range() {
        let lines = lines("one\n");
        assert_eq!(map_position(&lines, 0, 0), None);
        assert_eq!(map_position(&lines, 2, 0), None);
    }

    #[test]
    fn test_position_past_end_of_line_clamps() {
        let lines = lines("ab\n");
        // only two characters; requesting a far column yields the last one
        assert_eq!(map_position(&lines, 1, 40), Some(1));
    }

    #[test]
    fn test_source_text_offsets() {
        let source = SourceText::new("ab\ncd\n");
        let lines = source.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].offset, 0);
        assert_eq!(lines[1].offset, 3);
        assert_eq!(lines[1].text, "cd");
    }

    #[test]
    fn test_map_token() {
        let lines = lines("a\tb\n");
        let token = Token {
            index: 0,
            token_type: 4,
            text: "b".to_string(),
            line: 1,
            char_position: 8,
            start: 2,
            stop: 2,
        };
        assert_eq!(map_token(&lines, &token), Some(2));
    }
}
