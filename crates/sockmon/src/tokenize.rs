//! Zero-copy splitting of delimited byte regions.
//!
//! The kernel socket tables are re-read into one large buffer on every poll
//! cycle. Splitting that buffer into rows and columns happens on offsets
//! into the caller's buffer; handlers never receive an owned copy of a
//! token. Tokenizers compose through [`TokenHandler`]: the newline
//! tokenizer's handler is a space tokenizer, whose handler builds row
//! records, so one pass over the bytes performs the full two-level split.

/// Receives token sub-ranges from a [`DelimitedTokenizer`].
///
/// A handler may itself be another tokenizer, which is how the two-level
/// line/column split over a socket table is assembled.
pub trait TokenHandler {
    /// Handle one token occupying `buf[start..end]`.
    fn handle_token(&mut self, buf: &[u8], start: usize, end: usize);

    /// Clear any per-batch state before a new sequence of tokens arrives.
    fn reset(&mut self) {}
}

/// Splits a byte region on a single delimiter byte, forwarding each token
/// to the downstream handler before scanning continues.
///
/// With `collapse_empty` set, zero-length tokens are dropped; the kernel
/// tables pad columns with variable runs of spaces, so the column-level
/// tokenizer always runs in this mode.
pub struct DelimitedTokenizer<H> {
    delimiter: u8,
    collapse_empty: bool,
    next: H,
}

impl<H: TokenHandler> DelimitedTokenizer<H> {
    pub fn new(delimiter: u8, collapse_empty: bool, next: H) -> Self {
        Self {
            delimiter,
            collapse_empty,
            next,
        }
    }

    /// Split `buf[start..end]`, resetting the whole handler chain first so
    /// no partial state from a previous parse can leak into this one.
    pub fn parse(&mut self, buf: &[u8], start: usize, end: usize) {
        self.reset();
        self.handle_token(buf, start, end);
    }

    fn emit(&mut self, buf: &[u8], start: usize, end: usize) {
        if end > start || !self.collapse_empty {
            self.next.handle_token(buf, start, end);
        }
    }
}

impl<H: TokenHandler> TokenHandler for DelimitedTokenizer<H> {
    fn handle_token(&mut self, buf: &[u8], start: usize, end: usize) {
        self.next.reset();
        let mut token_start = start;
        for i in start..end {
            if buf[i] == self.delimiter {
                self.emit(buf, token_start, i);
                token_start = i + 1;
            }
        }
        self.emit(buf, token_start, end);
    }

    fn reset(&mut self) {
        self.next.reset();
    }
}
