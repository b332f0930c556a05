//! Lazy record stream over a line source.
//!
//! [`RecordStream`] pulls lines from any iterator only as fast as records
//! are consumed, and flushes the open block once the source is exhausted.

use std::collections::VecDeque;
use std::iter::FusedIterator;

use crate::context::ParseContext;
use crate::parser::ParserRegistry;
use crate::record::ErrorRecord;

/// Iterator of records produced from an iterator of lines.
pub struct RecordStream<I> {
    lines: I,
    registry: ParserRegistry,
    ctx: ParseContext,
    pending: VecDeque<ErrorRecord>,
    exhausted: bool,
}

impl<I, S> RecordStream<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    /// Stream over `lines` using every built-in parser.
    pub fn new(lines: I, ctx: ParseContext) -> Self {
        Self::with_registry(lines, ParserRegistry::new(), ctx)
    }

    pub fn with_registry(lines: I, registry: ParserRegistry, ctx: ParseContext) -> Self {
        Self {
            lines,
            registry,
            ctx,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn context(&self) -> &ParseContext {
        &self.ctx
    }

    /// Stop reading and return everything still owed: buffered records plus
    /// the open block, finalized. The stream yields nothing afterwards.
    pub fn flush(&mut self) -> Vec<ErrorRecord> {
        let mut out: Vec<ErrorRecord> = self.pending.drain(..).collect();
        if !self.exhausted {
            self.exhausted = true;
            out.extend(self.registry.flush(&self.ctx));
        }
        out
    }
}

impl<I, S> Iterator for RecordStream<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = ErrorRecord;

    fn next(&mut self) -> Option<ErrorRecord> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            if self.exhausted {
                return None;
            }
            match self.lines.next() {
                Some(line) => {
                    let records = self.registry.parse_line(line.as_ref(), &mut self.ctx);
                    self.pending.extend(records);
                }
                None => {
                    self.exhausted = true;
                    self.pending.extend(self.registry.flush(&self.ctx));
                }
            }
        }
    }
}

impl<I, S> FusedIterator for RecordStream<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
}

/// Extract every record from a block of log text with default settings.
pub fn extract(text: &str) -> Vec<ErrorRecord> {
    RecordStream::new(text.lines(), ParseContext::new()).collect()
}

/// Extract every record from `lines` with the given registry and context.
pub fn extract_with<I, S>(lines: I, registry: ParserRegistry, ctx: ParseContext) -> Vec<ErrorRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    RecordStream::with_registry(lines.into_iter(), registry, ctx).collect()
}
