//! Confidence arbitration between tool parsers.
//!
//! One [`ParserRegistry`] processes one log stream. It owns private parser
//! instances, so independent streams can be processed on separate threads
//! without sharing anything but the static pattern tables.

use crate::context::ParseContext;
use crate::noise;
use crate::preprocess::{self, Gate, LineLimits};
use crate::record::ErrorRecord;

use super::{default_parsers, AccumulatorLimits, Continuation, Extraction, Probe, ToolParser};

/// The dispatcher: feeds lines to parsers and collects finished records.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn ToolParser>>,
    line_limits: LineLimits,
    /// Index of the parser whose block is open, if any.
    active: Option<usize>,
}

impl ParserRegistry {
    /// Registry with every built-in parser and default limits.
    pub fn new() -> Self {
        Self::with_limits(LineLimits::default(), AccumulatorLimits::default())
    }

    pub fn with_limits(line_limits: LineLimits, acc_limits: AccumulatorLimits) -> Self {
        Self::with_parsers(default_parsers(acc_limits), line_limits)
    }

    /// Registry over an explicit parser list. Registration order is the
    /// last tie-break after confidence and priority.
    pub fn with_parsers(parsers: Vec<Box<dyn ToolParser>>, line_limits: LineLimits) -> Self {
        Self {
            parsers,
            line_limits,
            active: None,
        }
    }

    /// Remove a parser by id. Returns false if no such parser is registered.
    pub fn disable(&mut self, id: &str) -> bool {
        let before = self.parsers.len();
        self.reset();
        self.parsers.retain(|p| p.id() != id);
        self.parsers.len() != before
    }

    pub fn parser_ids(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.id()).collect()
    }

    pub fn parsers(&self) -> impl Iterator<Item = &dyn ToolParser> {
        self.parsers.iter().map(|p| p.as_ref())
    }

    pub fn line_limits(&self) -> LineLimits {
        self.line_limits
    }

    /// Whether a multi-line block is currently open.
    pub fn is_accumulating(&self) -> bool {
        self.active.is_some()
    }

    /// Feed one raw line.
    ///
    /// Returns the records completed by this line, in order: at most the
    /// block this line closed, followed by a record this line produced on
    /// its own.
    pub fn parse_line(&mut self, raw: &str, ctx: &mut ParseContext) -> Vec<ErrorRecord> {
        let line = preprocess::clean(raw);
        let mut records = Vec::new();

        if let Some(idx) = self.active {
            let view = clip(&line, self.line_limits.max_len);
            match self.parsers[idx].continue_block(view, ctx) {
                Continuation::Consumed => return records,
                Continuation::Completed => {
                    self.active = None;
                    records.extend(self.parsers[idx].finish(ctx));
                    return records;
                }
                Continuation::Boundary => {
                    self.active = None;
                    records.extend(self.parsers[idx].finish(ctx));
                }
            }
        }

        records.extend(self.dispatch(&line, ctx));
        records
    }

    /// Force the open block, if any, to finalize. Call at end of input or
    /// when the stream is abandoned.
    pub fn flush(&mut self, ctx: &ParseContext) -> Vec<ErrorRecord> {
        let Some(idx) = self.active.take() else {
            return Vec::new();
        };
        tracing::debug!(parser = self.parsers[idx].id(), "flushing open block");
        self.parsers[idx].finish(ctx).into_iter().collect()
    }

    /// Drop all open state without emitting anything.
    pub fn reset(&mut self) {
        self.active = None;
        for parser in &mut self.parsers {
            parser.reset();
        }
    }

    fn dispatch(&mut self, line: &str, ctx: &mut ParseContext) -> Option<ErrorRecord> {
        match self.line_limits.check(line) {
            Gate::Accept => {}
            Gate::TooShort | Gate::TooLong => return None,
        }
        if noise::is_shared_noise(line) {
            return None;
        }

        let (idx, probe) = self.select(line, ctx)?;
        let parser = &mut self.parsers[idx];
        tracing::trace!(
            parser = parser.id(),
            form = probe.form,
            confidence = probe.confidence,
            "line claimed"
        );

        match parser.extract(line, probe, ctx) {
            Extraction::Record(record) => Some(record),
            Extraction::Pending => {
                if parser.is_accumulating() {
                    self.active = Some(idx);
                }
                None
            }
            Extraction::Consumed => None,
        }
    }

    /// Highest confidence wins; ties go to the higher priority, then to the
    /// earlier registration.
    fn select(&self, line: &str, ctx: &ParseContext) -> Option<(usize, Probe)> {
        let mut best: Option<(usize, Probe)> = None;

        for (idx, parser) in self.parsers.iter().enumerate() {
            if parser.is_noise(line) {
                continue;
            }
            let Some(probe) = parser.probe(line, ctx) else {
                continue;
            };
            if probe.confidence <= 0.0 {
                continue;
            }
            let better = match &best {
                None => true,
                Some((best_idx, best_probe)) => {
                    probe.confidence > best_probe.confidence
                        || (probe.confidence == best_probe.confidence
                            && parser.priority() > self.parsers[*best_idx].priority())
                }
            };
            if better {
                best = Some((idx, probe));
            }
        }

        best
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Cut `line` to at most `max` bytes on a char boundary.
fn clip(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }
    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
