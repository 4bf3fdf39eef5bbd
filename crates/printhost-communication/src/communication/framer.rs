//! Line framing for the printer byte stream
//!
//! Network bridges in front of Prusa printers deliver lines in odd pieces:
//! a lone `o` followed by a lone `k`, or a chunk with no terminator at all.
//! The framer turns chunks into trimmed lines and glues single-character
//! pieces together in pairs.

/// Splits incoming chunks into lines
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Single character waiting for its partner
    fragment: Option<char>,
}

impl LineFramer {
    /// Create a new framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return the complete lines it yields
    ///
    /// A chunk containing `\n` is split on it and every piece, including
    /// the one after the last terminator, is emitted trimmed. A piece of
    /// exactly one character is held back and joined with the next
    /// one-character piece. A chunk without any terminator is emitted whole.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(chunk);
        let mut lines = Vec::new();

        if !text.contains('\n') {
            let line = text.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            return lines;
        }

        for piece in text.split('\n') {
            let piece = piece.trim();
            let mut chars = piece.chars();
            match (chars.next(), chars.next()) {
                (None, _) => {}
                (Some(c), None) => match self.fragment.take() {
                    Some(first) => lines.push(format!("{}{}", first, c)),
                    None => self.fragment = Some(c),
                },
                _ => lines.push(piece.to_string()),
            }
        }

        lines
    }

    /// Drop any held fragment
    pub fn reset(&mut self) {
        self.fragment = None;
    }
}
