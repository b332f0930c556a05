//! Shell, package-manager and runner failures.
//!
//! Every match is categorized as `infrastructure` and carries a remediation
//! hint. Rules are tried in table order; the first match wins.

use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;

use crate::context::ParseContext;
use crate::noise::NoiseTable;
use crate::parser::{cap_str, priority, Extraction, HeadFields, Probe, ToolParser};
use crate::record::{Category, ErrorRecord, Severity, Source};

/// How a rule turns its match into a rule id and hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Fixed,
    /// `npm ERR! code ENOSPC` → `enospc`
    NpmCode,
    /// `ERR_PNPM_FETCH_404` → `err_pnpm_fetch_404`
    PnpmCode,
    /// `Process completed with exit code 137.` → `exit-137`
    ExitCode,
}

struct Rule {
    id: &'static str,
    kind: RuleKind,
    pattern: Regex,
    confidence: f32,
    hint: &'static str,
}

fn rule(id: &'static str, kind: RuleKind, pattern: &str, confidence: f32, hint: &'static str) -> Rule {
    Rule {
        id,
        kind,
        pattern: Regex::new(pattern).unwrap(),
        confidence,
        hint,
    }
}

lazy_static! {
    static ref RULES: Vec<Rule> = vec![
        rule("npm", RuleKind::NpmCode, r"^npm (?:ERR!|error) code (E[A-Z0-9_]{1,40})$", 0.85, ""),
        rule("pnpm", RuleKind::PnpmCode, r"^\s{0,4}(ERR_PNPM_[A-Z0-9_]{1,60})\b", 0.85, ""),
        rule(
            "exit-code",
            RuleKind::ExitCode,
            r"^(?:##\[error\]|Error: )?Process completed with exit code (\d{1,3})\.?$",
            0.8,
            "",
        ),
        rule(
            "command-not-found",
            RuleKind::Fixed,
            r"^(?:(?:/usr)?(?:/bin/)?(?:ba|z|da)?sh: (?:line \d{1,7}: |\d{1,7}: )?)?([0-9A-Za-z_.\-/]{1,200}): (?:command )?not found$",
            0.85,
            "Install the missing tool in an earlier step or fix PATH",
        ),
        rule(
            "node-heap-oom",
            RuleKind::Fixed,
            r"^FATAL ERROR: .{0,200}JavaScript heap out of memory$",
            0.85,
            "Raise the heap limit with NODE_OPTIONS=--max-old-space-size=<MB> or reduce memory usage",
        ),
        rule(
            "jvm-oom",
            RuleKind::Fixed,
            r#"^(?:Exception in thread "[^"]{1,200}" )?java\.lang\.OutOfMemoryError: .{1,300}$"#,
            0.85,
            "Raise -Xmx (JAVA_OPTS, GRADLE_OPTS or MAVEN_OPTS) or use a larger runner",
        ),
        rule(
            "oom-killed",
            RuleKind::Fixed,
            r"^.{0,200}(?:Out of memory: Killed process|oom-kill:|invoked oom-killer)",
            0.8,
            "The kernel killed a process for exceeding memory; reduce parallelism or use a larger runner",
        ),
        rule(
            "disk-full",
            RuleKind::Fixed,
            r"^.{0,300}(?:[Nn]o space left on device|ENOSPC)",
            0.8,
            "Free disk space on the runner (prune Docker images, clear caches) or use a larger disk",
        ),
        rule(
            "git-auth",
            RuleKind::Fixed,
            r"^(?:fatal: (?:Authentication failed for|could not read Username for)|remote: (?:Invalid username or password|Permission to .{1,300} denied)|.{0,200}Permission denied \(publickey\))",
            0.85,
            "Check the repository credentials (token scopes, deploy key or SSH agent)",
        ),
        rule(
            "git-remote",
            RuleKind::Fixed,
            r"^fatal: (?:repository '.{1,500}' not found|unable to access '.{1,500}': .{1,300})$",
            0.8,
            "Check the remote URL and that the token can access the repository",
        ),
        rule(
            "docker-auth",
            RuleKind::Fixed,
            r"^(?:Error response from daemon: )?(?:pull access denied|unauthorized: (?:authentication required|incorrect username or password)|denied: requested access to the resource is denied)",
            0.85,
            "Log in to the registry (docker/login-action) before pulling or pushing",
        ),
        rule(
            "docker-daemon",
            RuleKind::Fixed,
            r"^(?:docker: )?(?:Cannot connect to the Docker daemon|Error response from daemon: .{1,500}$)",
            0.8,
            "Check that the Docker daemon is running and reachable from the job",
        ),
        rule(
            "pip-resolution",
            RuleKind::Fixed,
            r"^ERROR: (?:Could not find a version that satisfies the requirement|No matching distribution found for|ResolutionImpossible|Cannot install .{1,300} because these package versions have conflicting dependencies)",
            0.8,
            "Check the requirement pins against the package index and Python version",
        ),
        rule(
            "apt",
            RuleKind::Fixed,
            r"^E: (?:Unable to locate package|Package '.{1,200}' has no installation candidate|Unable to fetch some archives|Could not get lock|Failed to fetch)",
            0.8,
            "Run apt-get update first and check the package name for this distribution",
        ),
        rule(
            "dns",
            RuleKind::Fixed,
            r"^.{0,300}(?:getaddrinfo (?:ENOTFOUND|EAI_AGAIN)|Could not resolve host: |Temporary failure in name resolution|Name or service not known)",
            0.8,
            "A hostname could not be resolved; check the URL and retry for transient DNS failures",
        ),
        rule(
            "network",
            RuleKind::Fixed,
            r"^.{0,300}(?:ECONNREFUSED|ECONNRESET|ETIMEDOUT|Connection refused|Connection timed out|Connection reset by peer)",
            0.75,
            "A network connection failed; check the service is up and retry transient failures",
        ),
        rule(
            "permission-denied",
            RuleKind::Fixed,
            r"^.{0,300}: [Pp]ermission denied$",
            0.8,
            "Check file permissions (chmod +x for scripts) or the user the step runs as",
        ),
        rule(
            "job-timeout",
            RuleKind::Fixed,
            r"^(?:##\[error\])?The job running on runner .{1,300} has exceeded the maximum execution time",
            0.85,
            "Raise timeout-minutes for the job or speed up the slow step",
        ),
        rule(
            "cancelled",
            RuleKind::Fixed,
            r"^(?:##\[error\])?The operation was canceled\.$",
            0.75,
            "The job was cancelled before it finished; re-run it if the cancellation was not intended",
        ),
        rule(
            "runner-shutdown",
            RuleKind::Fixed,
            r"^(?:##\[error\])?The runner has received a shutdown signal",
            0.8,
            "The runner went away mid-job; re-run, and check for memory exhaustion on self-hosted runners",
        ),
        rule(
            "make",
            RuleKind::Fixed,
            r"^make(?:\[\d{1,3}\])?: \*\*\* \[.{1,500}\] Error \d{1,3}$",
            0.75,
            "A make target failed; see the command output above",
        ),
    ];

    pub(crate) static ref NOISE: NoiseTable = NoiseTable::new(
        &[
            "npm warn",
            "npm notice",
            "npm http",
            "npm timing",
            "added ",
            "removed ",
            "changed ",
            "up to date",
            "audited ",
            "run `npm fund`",
            "lockfile is up to date",
            "progress: resolved",
            "already up to date",
            "hit:",
            "get:",
            "reading package lists",
            "building dependency tree",
            "reading state information",
            "using cached",
        ],
        &["looking for funding", "0 vulnerabilities"],
        &[
            r"^npm (?:ERR!|error) A complete log of this run",
            r"^npm (?:ERR!|error) (?:path|syscall|errno) ",
        ],
    );
}

/// Hints for npm error codes.
static NPM_HINTS: phf::Map<&'static str, &'static str> = phf_map! {
    "ENOSPC" => "Free disk space on the runner (prune Docker images, clear caches) or use a larger disk",
    "ENOMEM" => "The install ran out of memory; reduce concurrency or use a larger runner",
    "ERESOLVE" => "Resolve the peer dependency conflict, or retry with --legacy-peer-deps",
    "E404" => "Check the package name and the configured registry",
    "ETARGET" => "No published version matches the requested range; check the version pin",
    "E401" => "Check the registry auth token (NPM_TOKEN / .npmrc)",
    "E403" => "The token lacks access to this package or registry",
    "EACCES" => "Check file permissions, or avoid installing global packages as a non-root user",
    "EPERM" => "An operation was not permitted; check file locks and permissions",
    "EINTEGRITY" => "Clear the npm cache and regenerate the lockfile",
    "ETIMEDOUT" => "Registry request timed out; retry or check network access to the registry",
    "ECONNRESET" => "Registry connection was reset; retry or check proxy settings",
    "ECONNREFUSED" => "Registry refused the connection; check the registry URL and proxy settings",
    "ENOTFOUND" => "Registry host could not be resolved; check the registry URL and DNS",
    "EAI_AGAIN" => "Temporary DNS failure resolving the registry; retry",
    "ENOENT" => "A file or directory was missing; check paths and that earlier steps ran",
    "ELIFECYCLE" => "A package script failed; see its output above",
};

const NPM_DEFAULT_HINT: &str = "See the npm debug log for details";
const PNPM_HINT: &str = "See the pnpm error above; retry after clearing the store if it is a fetch error";

/// Hint for a process exit status, decoding common signals.
fn exit_code_hint(code: u32) -> &'static str {
    match code {
        1 => "The step's command failed; see the errors above",
        2 => "The command was misused or a build tool reported failure; check its arguments",
        126 => "A command was found but is not executable; check file permissions (chmod +x)",
        127 => "A command was not found; install it in an earlier step or fix PATH",
        130 => "The process was interrupted (SIGINT)",
        137 => "The process was killed (SIGKILL), usually for exceeding memory; reduce usage or use a larger runner",
        139 => "The process crashed with a segmentation fault (SIGSEGV)",
        143 => "The process was terminated (SIGTERM), often by a timeout or cancellation",
        _ => "The step exited with a non-zero status; see the output above",
    }
}

/// Parser for infrastructure failures.
#[derive(Debug, Default)]
pub struct InfrastructureParser;

impl InfrastructureParser {
    pub fn new() -> Self {
        Self
    }
}

impl ToolParser for InfrastructureParser {
    fn id(&self) -> &'static str {
        "infrastructure"
    }

    fn priority(&self) -> i32 {
        priority::INFRASTRUCTURE
    }

    fn noise_table(&self) -> Option<&'static NoiseTable> {
        Some(&NOISE)
    }

    fn probe(&self, line: &str, _ctx: &ParseContext) -> Option<Probe> {
        let line = line.trim();

        for rule in RULES.iter() {
            // npm repeats the code's text on its own lines; the code line is the record
            if rule.id == "disk-full" && line.starts_with("npm ") {
                continue;
            }
            let Some(c) = rule.pattern.captures(line) else {
                continue;
            };

            let (code, hint) = match rule.kind {
                RuleKind::Fixed => (rule.id.to_string(), rule.hint),
                RuleKind::NpmCode => {
                    let code = cap_str(&c, 1).unwrap_or_default();
                    let hint = NPM_HINTS.get(code).copied().unwrap_or(NPM_DEFAULT_HINT);
                    (code.to_ascii_lowercase(), hint)
                }
                RuleKind::PnpmCode => {
                    let code = cap_str(&c, 1).unwrap_or_default();
                    (code.to_ascii_lowercase(), PNPM_HINT)
                }
                RuleKind::ExitCode => {
                    let code: u32 = cap_str(&c, 1).and_then(|s| s.parse().ok()).unwrap_or(1);
                    (format!("exit-{}", code), exit_code_hint(code))
                }
            };

            let message = line.strip_prefix("##[error]").unwrap_or(line);
            let fields = HeadFields {
                severity: Some(Severity::Error),
                code: Some(code),
                message: Some(message.to_string()),
                detail: Some(hint.to_string()),
                ..HeadFields::default()
            };
            return Some(Probe::new(rule.confidence, rule.id, fields));
        }
        None
    }

    fn extract(&mut self, _line: &str, probe: Probe, ctx: &mut ParseContext) -> Extraction {
        let HeadFields {
            code,
            message,
            detail,
            ..
        } = probe.fields;

        let mut builder = ErrorRecord::builder(
            message.unwrap_or_default(),
            Severity::Error,
            Category::Infrastructure,
            Source::Infrastructure,
        )
        .rule_id(code);
        if let Some(hint) = detail {
            builder = builder.suggestion(hint);
        }
        Extraction::Record(builder.build(ctx))
    }
}

/// Force compilation of this module's static patterns.
pub(crate) fn initialize_patterns() {
    lazy_static::initialize(&RULES);
    lazy_static::initialize(&NOISE);
}
