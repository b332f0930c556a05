//! Bounded multi-line accumulation.
//!
//! Each multi-line parser owns one [`MultiLine`] value. The accumulator
//! inside it keeps its line and byte counters consistent with its content,
//! and once either ceiling is reached it stops appending: later lines are
//! still offered to the parser, but only to find the block boundary.

use super::HeadFields;

/// Default ceiling on accumulated lines per block.
pub const DEFAULT_MAX_CONTEXT_LINES: usize = 200;

/// Default ceiling on accumulated bytes per block.
pub const DEFAULT_MAX_CONTEXT_BYTES: usize = 64 * 1024;

/// Ceiling on auxiliary lists (notes, help text).
pub const MAX_AUX_ITEMS: usize = 16;

/// Resource ceilings for one accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulatorLimits {
    pub max_lines: usize,
    pub max_bytes: usize,
}

impl Default for AccumulatorLimits {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_CONTEXT_LINES,
            max_bytes: DEFAULT_MAX_CONTEXT_BYTES,
        }
    }
}

/// Lines and fields gathered for one diagnostic block.
#[derive(Debug, Clone)]
pub struct Accumulator {
    pub head: HeadFields,
    lines: Vec<String>,
    bytes: usize,
    notes: Vec<String>,
    help: Vec<String>,
    truncated: bool,
    limits: AccumulatorLimits,
}

impl Accumulator {
    /// Open a block with its header line. The header is always kept, clipped
    /// on a char boundary to the byte ceiling.
    pub fn new(header: &str, head: HeadFields, limits: AccumulatorLimits) -> Self {
        let mut acc = Self {
            head,
            lines: Vec::new(),
            bytes: 0,
            notes: Vec::new(),
            help: Vec::new(),
            truncated: false,
            limits,
        };
        let mut end = header.len().min(limits.max_bytes);
        while !header.is_char_boundary(end) {
            end -= 1;
        }
        let kept = &header[..end];
        acc.bytes = kept.len();
        acc.truncated = kept.len() < header.len();
        acc.lines.push(kept.to_string());
        acc
    }

    /// Whether another line of `len` bytes still fits under both ceilings.
    pub fn has_room(&self, len: usize) -> bool {
        !self.truncated
            && self.lines.len() < self.limits.max_lines
            && self.bytes + len <= self.limits.max_bytes
    }

    /// Append a context line. Returns false, and marks the block truncated,
    /// when a ceiling would be exceeded.
    pub fn push(&mut self, line: &str) -> bool {
        if !self.has_room(line.len()) {
            if !self.truncated {
                tracing::debug!(
                    lines = self.lines.len(),
                    bytes = self.bytes,
                    "accumulator ceiling reached; truncating block"
                );
            }
            self.truncated = true;
            return false;
        }
        self.bytes += line.len();
        self.lines.push(line.to_string());
        true
    }

    pub fn push_note(&mut self, note: &str) {
        if self.notes.len() < MAX_AUX_ITEMS {
            self.notes.push(note.trim().to_string());
        }
    }

    pub fn push_help(&mut self, help: &str) {
        if self.help.len() < MAX_AUX_ITEMS {
            self.help.push(help.trim().to_string());
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn help(&self) -> &[String] {
        &self.help
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn byte_count(&self) -> usize {
        self.bytes
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// All kept lines, in order, joined with newlines.
    pub fn stack_trace(&self) -> String {
        self.lines.join("\n")
    }
}

/// Tagged multi-line state owned by a single parser instance.
///
/// `K` is the parser's own notion of what kind of block is open
/// (e.g. a compiler diagnostic versus a panic).
#[derive(Debug, Clone)]
pub enum MultiLine<K> {
    Idle,
    Accumulating { kind: K, acc: Accumulator },
}

impl<K> Default for MultiLine<K> {
    fn default() -> Self {
        MultiLine::Idle
    }
}

impl<K> MultiLine<K> {
    pub fn is_active(&self) -> bool {
        matches!(self, MultiLine::Accumulating { .. })
    }

    pub fn begin(&mut self, kind: K, acc: Accumulator) {
        *self = MultiLine::Accumulating { kind, acc };
    }

    /// Close the block, returning its contents and leaving the state idle.
    pub fn take(&mut self) -> Option<(K, Accumulator)> {
        match std::mem::take(self) {
            MultiLine::Idle => None,
            MultiLine::Accumulating { kind, acc } => Some((kind, acc)),
        }
    }

    pub fn get_mut(&mut self) -> Option<(&mut K, &mut Accumulator)> {
        match self {
            MultiLine::Idle => None,
            MultiLine::Accumulating { kind, acc } => Some((kind, acc)),
        }
    }

    pub fn reset(&mut self) {
        *self = MultiLine::Idle;
    }
}
