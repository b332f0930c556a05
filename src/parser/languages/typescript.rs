//! TypeScript compiler (`tsc`) diagnostics.
//!
//! Recognized forms:
//! - `src/app.ts(10,5): error TS2322: message`
//! - `src/app.ts:10:5 - error TS2322: message` (pretty output)
//! - `error TS5023: message` (no location)

use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;

use crate::context::ParseContext;
use crate::noise::NoiseTable;
use crate::parser::{cap, priority, Extraction, HeadFields, Probe, ToolParser};
use crate::record::{parse_number, Category, ErrorRecord, Severity, Source};

const FORM_PAREN: &str = "paren";
const FORM_COLON: &str = "colon";
const FORM_GLOBAL: &str = "global";

lazy_static! {
    static ref PAREN: Regex = Regex::new(
        r"^([^\s(][^(]{0,500})\((\d{1,7}),(\d{1,7})\): (error|warning) TS(\d{1,6}): (.{1,4000})$"
    ).unwrap();

    static ref COLON: Regex = Regex::new(
        r"^([^\s:][^:]{0,500}\.(?:ts|tsx|mts|cts|js|jsx|mjs|cjs|vue)):(\d{1,7}):(\d{1,7})(?: -|:) (error|warning) TS(\d{1,6}): (.{1,4000})$"
    ).unwrap();

    static ref GLOBAL: Regex =
        Regex::new(r"^(error|warning) TS(\d{1,6}): (.{1,4000})$").unwrap();

    pub(crate) static ref NOISE: NoiseTable = NoiseTable::new(
        &[
            "starting compilation",
            "file change detected",
            "watching for file changes",
            "> tsc",
            "$ tsc",
            "version ",
            "tsc --",
        ],
        &["found 0 errors", "watching for file changes"],
        &[
            // summary after a failed run; the errors themselves were already reported
            r"(?i)^found \d{1,6} errors?(?: in \d{1,6} files?)?\.?",
            r"(?i)^errors\s{1,8}files?$",
            r"^\s{0,8}\d{1,6}\s{1,8}[^\s:]{1,300}:\d{1,7}$",
        ],
    );
}

/// Codes whose message means an import could not be resolved.
static DEPENDENCY_CODES: phf::Map<u32, &'static str> = phf_map! {
    2307u32 => "Install the missing package, or add its type declarations (@types/...)",
    2792u32 => "Check moduleResolution in tsconfig.json and that the package is installed",
    7016u32 => "Install the package's @types declarations or add a local .d.ts module declaration",
};

/// Codes reporting declarations that are never read.
static UNUSED_CODES: phf::Map<u32, &'static str> = phf_map! {
    6133u32 => "Remove the unused declaration or prefix it with an underscore",
    6138u32 => "Remove the unused property",
    6192u32 => "Remove the unused imports",
    6196u32 => "Remove the unused declaration",
    6198u32 => "Remove the unused destructured elements",
    6205u32 => "Remove the unused type parameters",
};

/// Category for a `TS` diagnostic number.
pub fn category_for_code(code: u32) -> Category {
    if DEPENDENCY_CODES.contains_key(&code) {
        return Category::Dependency;
    }
    if UNUSED_CODES.contains_key(&code) {
        return Category::TypeCheck;
    }
    match code {
        1000..=1999 => Category::Compile,
        2000..=2999 | 4000..=4999 | 7000..=7999 | 17000..=18999 => Category::TypeCheck,
        5000..=5999 => Category::Config,
        6000..=6999 => Category::Metadata,
        _ => Category::TypeCheck,
    }
}

fn suggestion_for_code(code: u32) -> Option<&'static str> {
    DEPENDENCY_CODES
        .get(&code)
        .or_else(|| UNUSED_CODES.get(&code))
        .copied()
}

/// Parser for `tsc` output.
#[derive(Debug, Default)]
pub struct TypeScriptParser;

impl TypeScriptParser {
    pub fn new() -> Self {
        Self
    }
}

impl ToolParser for TypeScriptParser {
    fn id(&self) -> &'static str {
        "typescript"
    }

    fn priority(&self) -> i32 {
        priority::TYPESCRIPT
    }

    fn noise_table(&self) -> Option<&'static NoiseTable> {
        Some(&NOISE)
    }

    fn probe(&self, line: &str, _ctx: &ParseContext) -> Option<Probe> {
        let line = line.trim_end();

        if let Some(c) = PAREN.captures(line) {
            let fields = HeadFields {
                file: cap(&c, 1).map(|f| f.trim_end().to_string()),
                line: parse_number(c.get(2).map(|m| m.as_str())),
                column: parse_number(c.get(3).map(|m| m.as_str())),
                severity: c.get(4).map(|m| Severity::from_word(m.as_str())),
                code: cap(&c, 5),
                message: cap(&c, 6),
                detail: None,
            };
            return Some(Probe::new(0.95, FORM_PAREN, fields));
        }

        if let Some(c) = COLON.captures(line) {
            let fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(c.get(2).map(|m| m.as_str())),
                column: parse_number(c.get(3).map(|m| m.as_str())),
                severity: c.get(4).map(|m| Severity::from_word(m.as_str())),
                code: cap(&c, 5),
                message: cap(&c, 6),
                detail: None,
            };
            return Some(Probe::new(0.9, FORM_COLON, fields));
        }

        GLOBAL.captures(line).map(|c| {
            let fields = HeadFields {
                severity: c.get(1).map(|m| Severity::from_word(m.as_str())),
                code: cap(&c, 2),
                message: cap(&c, 3),
                ..HeadFields::default()
            };
            Probe::new(0.85, FORM_GLOBAL, fields)
        })
    }

    fn extract(&mut self, _line: &str, probe: Probe, ctx: &mut ParseContext) -> Extraction {
        let HeadFields {
            file,
            line,
            column,
            severity,
            code,
            message,
            ..
        } = probe.fields;

        let number = code.as_deref().and_then(|c| c.parse::<u32>().ok());
        let category = number.map(category_for_code).unwrap_or(Category::TypeCheck);

        let mut builder = ErrorRecord::builder(
            message.unwrap_or_default(),
            severity.unwrap_or(Severity::Error),
            category,
            Source::Typescript,
        )
        .file(file)
        .location(line, column)
        .rule_id(code.map(|c| format!("TS{}", c)));

        if let Some(hint) = number.and_then(suggestion_for_code) {
            builder = builder.suggestion(hint);
        }

        Extraction::Record(builder.build(ctx))
    }
}

/// Force compilation of this module's static patterns.
pub(crate) fn initialize_patterns() {
    lazy_static::initialize(&PAREN);
    lazy_static::initialize(&COLON);
    lazy_static::initialize(&GLOBAL);
    lazy_static::initialize(&NOISE);
}
