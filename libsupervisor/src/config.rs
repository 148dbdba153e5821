//! Loading and validation of the process spec table.
//!
//! The on-disk format is a sectioned key/value file:
//!
//! ```text
//! [supervisord]
//! nodaemon=true
//!
//! [unix_http_server]
//! file=/tmp/rsupd.sock
//!
//! [program:worker]
//! command=/usr/bin/worker --queue all
//! autorestart=unexpected
//! priority=100
//!
//! [group:web]
//! programs=gateway,asgi
//! priority=5
//! ```
//!
//! Everything is resolved exactly once here: commands are split into argv,
//! `%(...)s` expansions are applied, sizes and signals are parsed. After
//! `Config::load` returns there is no runtime string re-interpretation and
//! no mutation API.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    Never,
    Always,
    OnUnexpectedExit,
}

/// Destination for one child output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSpec {
    /// Bytes are read and thrown away.
    Discard,
    /// Pass-through to the supervisor's own stdout.
    Inherit,
    /// Size-rotated file. `max_bytes == 0` disables rotation.
    File {
        path: PathBuf,
        max_bytes: u64,
        backups: u32,
    },
}

/// What to do when a sink cannot keep up with the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop chunks and keep draining the child. Default.
    Drop,
    /// Apply backpressure up the pipe; the child may stall writing until
    /// the sink catches up.
    Block,
}

/// One child definition. Immutable after load.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub autostart: bool,
    pub autorestart: RestartPolicy,
    /// Exit codes treated as expected by `RestartPolicy::OnUnexpectedExit`.
    pub exit_codes: Vec<i32>,
    /// Minimum uptime before a start is considered successful.
    pub start_secs: Duration,
    /// Spawn attempts per explicit start before giving up.
    pub start_retries: u32,
    /// Automatic restarts allowed before the child is parked in stopped.
    pub max_restarts: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
    pub stop_signal: Signal,
    pub stop_timeout: Duration,
    pub priority: i32,
    /// A failed start of a required group member aborts the group start.
    pub required: bool,
    pub stdout: SinkSpec,
    pub stderr: SinkSpec,
    pub redirect_stderr: bool,
    pub overflow: OverflowPolicy,
}

impl ProcessSpec {
    /// A spec with the documented defaults, mainly for tests and embedding.
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        ProcessSpec {
            name: name.into(),
            argv,
            env: Vec::new(),
            autostart: true,
            autorestart: RestartPolicy::OnUnexpectedExit,
            exit_codes: vec![0],
            start_secs: Duration::from_secs(1),
            start_retries: 3,
            max_restarts: 10,
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            stop_signal: Signal::SIGTERM,
            stop_timeout: Duration::from_secs(10),
            priority: 999,
            required: false,
            stdout: SinkSpec::Inherit,
            stderr: SinkSpec::Inherit,
            redirect_stderr: false,
            overflow: OverflowPolicy::Drop,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub name: String,
    pub members: Vec<String>,
    pub priority: i32,
}

#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub nodaemon: bool,
    pub logfile: Option<PathBuf>,
    pub pidfile: Option<PathBuf>,
    /// Directory for AUTO child log files.
    pub childlogdir: PathBuf,
    pub umask: Option<u32>,
    pub minfds: Option<u64>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            nodaemon: false,
            logfile: None,
            pidfile: None,
            childlogdir: PathBuf::from("/tmp"),
            umask: None,
            minfds: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub file: PathBuf,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            file: PathBuf::from("/tmp/rsupd.sock"),
        }
    }
}

/// The parsed, validated spec table. Read-only after load.
#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub socket: SocketConfig,
    /// Declaration order is preserved; it breaks priority ties.
    pub programs: Vec<Arc<ProcessSpec>>,
    pub groups: Vec<GroupSpec>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Config::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let sections = split_sections(text)?;
        build(sections)
    }

    pub fn program(&self, name: &str) -> Option<&Arc<ProcessSpec>> {
        self.programs.iter().find(|p| p.name == name)
    }

    /// Group the given program belongs to, implicit single-member groups
    /// included.
    pub fn group_of(&self, program: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.members.iter().any(|m| m == program))
            .map(|g| g.name.as_str())
    }
}

#[derive(Debug)]
enum SectionKind {
    Supervisord,
    ControlSocket,
    Program(String),
    Group(String),
}

struct Section {
    kind: SectionKind,
    entries: Vec<(usize, String, String)>,
}

fn split_sections(text: &str) -> Result<Vec<Section>, ConfigError> {
    let mut sections: Vec<Section> = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[') {
            let Some(header) = header.strip_suffix(']') else {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    reason: "unterminated section header".into(),
                });
            };
            let kind = match header {
                "supervisord" => SectionKind::Supervisord,
                // both spellings of the control socket section are accepted
                "unix_http_server" | "control-endpoint" => SectionKind::ControlSocket,
                other => {
                    if let Some(name) = other.strip_prefix("program:") {
                        SectionKind::Program(name.to_string())
                    } else if let Some(name) = other.strip_prefix("group:") {
                        SectionKind::Group(name.to_string())
                    } else {
                        return Err(ConfigError::Syntax {
                            line: line_no,
                            reason: format!("unknown section [{other}]"),
                        });
                    }
                }
            };
            if matches!(&kind, SectionKind::Program(n) | SectionKind::Group(n) if n.is_empty()) {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    reason: "empty section name".into(),
                });
            }
            sections.push(Section {
                kind,
                entries: Vec::new(),
            });
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Syntax {
                line: line_no,
                reason: format!("expected key=value, got {line:?}"),
            });
        };
        let Some(section) = sections.last_mut() else {
            return Err(ConfigError::Syntax {
                line: line_no,
                reason: "key/value outside of any section".into(),
            });
        };
        section
            .entries
            .push((line_no, key.trim().to_string(), value.trim().to_string()));
    }
    Ok(sections)
}

fn build(sections: Vec<Section>) -> Result<Config, ConfigError> {
    let mut global = GlobalConfig::default();
    let mut socket = SocketConfig::default();
    let mut raw_programs: Vec<(String, HashMap<String, String>)> = Vec::new();
    let mut groups: Vec<GroupSpec> = Vec::new();

    for section in sections {
        match section.kind {
            SectionKind::Supervisord => {
                for (_, key, value) in &section.entries {
                    apply_global(&mut global, key, value)?;
                }
            }
            SectionKind::ControlSocket => {
                for (_, key, value) in &section.entries {
                    match key.as_str() {
                        "file" => socket.file = PathBuf::from(value),
                        _ => {
                            return Err(invalid("unix_http_server", key, "unknown key"));
                        }
                    }
                }
            }
            SectionKind::Program(name) => {
                if raw_programs.iter().any(|(n, _)| *n == name) {
                    return Err(ConfigError::DuplicateProgram(name));
                }
                let mut map = HashMap::new();
                for (_, key, value) in section.entries {
                    map.insert(key, value);
                }
                raw_programs.push((name, map));
            }
            SectionKind::Group(name) => {
                let mut members = Vec::new();
                let mut priority = 999;
                for (_, key, value) in &section.entries {
                    match key.as_str() {
                        "programs" => {
                            members = value
                                .split(',')
                                .map(|s| s.trim().to_string())
                                .filter(|s| !s.is_empty())
                                .collect();
                        }
                        "priority" => {
                            priority = value.parse().map_err(|_| {
                                invalid(&format!("group:{name}"), key, "expected an integer")
                            })?;
                        }
                        _ => {
                            return Err(invalid(&format!("group:{name}"), key, "unknown key"));
                        }
                    }
                }
                groups.push(GroupSpec {
                    name,
                    members,
                    priority,
                });
            }
        }
    }

    // group members must resolve, and a program joins at most one group
    let mut grouped: HashSet<String> = HashSet::new();
    for group in &groups {
        for member in &group.members {
            if !raw_programs.iter().any(|(n, _)| n == member) {
                return Err(ConfigError::UnknownGroupMember {
                    group: group.name.clone(),
                    member: member.clone(),
                });
            }
            if !grouped.insert(member.clone()) {
                return Err(ConfigError::DuplicateGroupMember {
                    program: member.clone(),
                });
            }
        }
    }

    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let mut programs = Vec::with_capacity(raw_programs.len());
    for (name, raw) in raw_programs {
        let group_name = groups
            .iter()
            .find(|g| g.members.iter().any(|m| *m == name))
            .map(|g| g.name.clone())
            .unwrap_or_else(|| name.clone());
        let spec = build_program(&name, &group_name, &host, raw, &global)?;
        programs.push(Arc::new(spec));
    }

    Ok(Config {
        global,
        socket,
        programs,
        groups,
    })
}

fn apply_global(global: &mut GlobalConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "nodaemon" => global.nodaemon = parse_bool("supervisord", key, value)?,
        "logfile" => global.logfile = Some(PathBuf::from(value)),
        "pidfile" => global.pidfile = Some(PathBuf::from(value)),
        "childlogdir" => global.childlogdir = PathBuf::from(value),
        "umask" => {
            global.umask = Some(
                u32::from_str_radix(value, 8)
                    .map_err(|_| invalid("supervisord", key, "expected an octal mode"))?,
            );
        }
        "minfds" => {
            global.minfds = Some(
                value
                    .parse()
                    .map_err(|_| invalid("supervisord", key, "expected an integer"))?,
            );
        }
        _ => return Err(invalid("supervisord", key, "unknown key")),
    }
    Ok(())
}

fn build_program(
    name: &str,
    group_name: &str,
    host: &str,
    mut raw: HashMap<String, String>,
    global: &GlobalConfig,
) -> Result<ProcessSpec, ConfigError> {
    let section = format!("program:{name}");
    let mut spec = ProcessSpec::new(name, Vec::new());

    let expansions = ExpansionContext {
        program_name: name,
        group_name,
        host_node_name: host,
    };

    let command = raw
        .remove("command")
        .ok_or_else(|| ConfigError::EmptyCommand(name.to_string()))?;
    let command = expansions.expand(&command)?;
    spec.argv = split_command(&command);
    if spec.argv.is_empty() {
        return Err(ConfigError::EmptyCommand(name.to_string()));
    }

    if let Some(value) = raw.remove("environment") {
        let value = expansions.expand(&value)?;
        spec.env = parse_environment(&section, &value)?;
    }

    if let Some(v) = raw.remove("autostart") {
        spec.autostart = parse_bool(&section, "autostart", &v)?;
    }
    if let Some(v) = raw.remove("autorestart") {
        spec.autorestart = match v.as_str() {
            "never" | "false" => RestartPolicy::Never,
            "always" | "true" => RestartPolicy::Always,
            "unexpected" => RestartPolicy::OnUnexpectedExit,
            _ => {
                return Err(invalid(
                    &section,
                    "autorestart",
                    "expected never, always or unexpected",
                ));
            }
        };
    }
    if let Some(v) = raw.remove("exitcodes") {
        spec.exit_codes = v
            .split(',')
            .map(|s| s.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid(&section, "exitcodes", "expected a comma list of integers"))?;
    }
    if let Some(v) = raw.remove("startsecs") {
        spec.start_secs = parse_seconds(&section, "startsecs", &v)?;
    }
    if let Some(v) = raw.remove("startretries") {
        spec.start_retries = parse_int(&section, "startretries", &v)?;
    }
    if let Some(v) = raw.remove("maxrestarts") {
        spec.max_restarts = parse_int(&section, "maxrestarts", &v)?;
    }
    if let Some(v) = raw.remove("backoffsecs") {
        spec.backoff = parse_seconds(&section, "backoffsecs", &v)?;
    }
    if let Some(v) = raw.remove("maxbackoffsecs") {
        spec.max_backoff = parse_seconds(&section, "maxbackoffsecs", &v)?;
    }
    if let Some(v) = raw.remove("stopsignal") {
        spec.stop_signal = parse_signal(&section, &v)?;
    }
    if let Some(v) = raw.remove("stopwaitsecs") {
        spec.stop_timeout = parse_seconds(&section, "stopwaitsecs", &v)?;
    }
    if let Some(v) = raw.remove("priority") {
        spec.priority = parse_int(&section, "priority", &v)?;
    }
    if let Some(v) = raw.remove("required") {
        spec.required = parse_bool(&section, "required", &v)?;
    }
    if let Some(v) = raw.remove("redirect_stderr") {
        spec.redirect_stderr = parse_bool(&section, "redirect_stderr", &v)?;
    }
    if let Some(v) = raw.remove("overflow") {
        spec.overflow = match v.as_str() {
            "drop" => OverflowPolicy::Drop,
            "block" => OverflowPolicy::Block,
            _ => return Err(invalid(&section, "overflow", "expected drop or block")),
        };
    }

    spec.stdout = parse_sink(
        &section,
        name,
        "stdout",
        raw.remove("stdout_logfile"),
        raw.remove("stdout_logfile_maxbytes"),
        raw.remove("stdout_logfile_backups"),
        global,
    )?;
    spec.stderr = parse_sink(
        &section,
        name,
        "stderr",
        raw.remove("stderr_logfile"),
        raw.remove("stderr_logfile_maxbytes"),
        raw.remove("stderr_logfile_backups"),
        global,
    )?;

    if let Some(key) = raw.keys().next() {
        return Err(invalid(&section, key, "unknown key"));
    }
    Ok(spec)
}

fn parse_sink(
    section: &str,
    program: &str,
    label: &str,
    logfile: Option<String>,
    maxbytes: Option<String>,
    backups: Option<String>,
    global: &GlobalConfig,
) -> Result<SinkSpec, ConfigError> {
    let max_bytes = match maxbytes {
        Some(v) => parse_size(section, &format!("{label}_logfile_maxbytes"), &v)?,
        None => 50 * 1024 * 1024,
    };
    let backups = match backups {
        Some(v) => parse_int(section, &format!("{label}_logfile_backups"), &v)?,
        None => 4,
    };
    match logfile.as_deref() {
        None => Ok(SinkSpec::Inherit),
        Some("NONE") => Ok(SinkSpec::Discard),
        Some("AUTO") => Ok(SinkSpec::File {
            path: global.childlogdir.join(format!("{program}-{label}.log")),
            max_bytes,
            backups,
        }),
        Some(path) => Ok(SinkSpec::File {
            path: PathBuf::from(path),
            max_bytes,
            backups,
        }),
    }
}

struct ExpansionContext<'a> {
    program_name: &'a str,
    group_name: &'a str,
    host_node_name: &'a str,
}

impl ExpansionContext<'_> {
    /// Substitute `%(name)s` references. `%%` is a literal percent sign.
    fn expand(&self, input: &str) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('%') => {
                    chars.next();
                    out.push('%');
                }
                Some('(') => {
                    chars.next();
                    let mut key = String::new();
                    loop {
                        match chars.next() {
                            Some(')') => break,
                            Some(c) => key.push(c),
                            None => return Err(ConfigError::UnknownExpansion(key)),
                        }
                    }
                    // the trailing printf-style "s" conversion
                    if chars.next() != Some('s') {
                        return Err(ConfigError::UnknownExpansion(key));
                    }
                    out.push_str(&self.lookup(&key)?);
                }
                _ => return Err(ConfigError::UnknownExpansion(String::new())),
            }
        }
        Ok(out)
    }

    fn lookup(&self, key: &str) -> Result<String, ConfigError> {
        if let Some(var) = key.strip_prefix("ENV_") {
            return std::env::var(var).map_err(|_| ConfigError::UnknownExpansion(key.to_string()));
        }
        match key {
            "program_name" => Ok(self.program_name.to_string()),
            "group_name" => Ok(self.group_name.to_string()),
            "host_node_name" => Ok(self.host_node_name.to_string()),
            _ => Err(ConfigError::UnknownExpansion(key.to_string())),
        }
    }
}

/// Shell-style command splitting: whitespace separated, single and double
/// quotes group words, backslash escapes inside double quotes and bare text.
pub fn split_command(command: &str) -> Vec<String> {
    let mut argv = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {
                if in_word {
                    argv.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    current.push(c);
                }
            }
            '"' => {
                in_word = true;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => {
                            if let Some(next) = chars.next() {
                                current.push(next);
                            }
                        }
                        _ => current.push(c),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        argv.push(current);
    }
    argv
}

/// `KEY="value",OTHER=plain` pairs; quotes optional per value.
fn parse_environment(section: &str, value: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut env = Vec::new();
    let mut rest = value.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            return Err(invalid(section, "environment", "expected KEY=value pairs"));
        };
        let key = rest[..eq].trim().to_string();
        if key.is_empty() {
            return Err(invalid(section, "environment", "empty variable name"));
        }
        rest = &rest[eq + 1..];
        let val;
        if let Some(stripped) = rest.strip_prefix('"') {
            let Some(end) = stripped.find('"') else {
                return Err(invalid(section, "environment", "unterminated quote"));
            };
            val = stripped[..end].to_string();
            rest = stripped[end + 1..].trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        } else {
            match rest.find(',') {
                Some(comma) => {
                    val = rest[..comma].trim().to_string();
                    rest = rest[comma + 1..].trim_start();
                }
                None => {
                    val = rest.trim().to_string();
                    rest = "";
                }
            }
        }
        env.push((key, val));
    }
    Ok(env)
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(section, key, "expected a boolean")),
    }
}

fn parse_int<T: std::str::FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(section, key, "expected an integer"))
}

fn parse_seconds(section: &str, key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = value
        .parse()
        .map_err(|_| invalid(section, key, "expected seconds"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid(section, key, "expected non-negative seconds"));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// `1024`, `512KB`, `10MB`, `1GB`. 0 means unbounded.
fn parse_size(section: &str, key: &str, value: &str) -> Result<u64, ConfigError> {
    let value = value.trim();
    let (digits, multiplier) = if let Some(v) = value.strip_suffix("KB") {
        (v, 1024)
    } else if let Some(v) = value.strip_suffix("MB") {
        (v, 1024 * 1024)
    } else if let Some(v) = value.strip_suffix("GB") {
        (v, 1024 * 1024 * 1024)
    } else {
        (value, 1)
    };
    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, "expected a size like 10MB"))?;
    Ok(n * multiplier)
}

fn parse_signal(section: &str, value: &str) -> Result<Signal, ConfigError> {
    let name = value.strip_prefix("SIG").unwrap_or(value);
    let signal = match name {
        "TERM" => Signal::SIGTERM,
        "INT" => Signal::SIGINT,
        "QUIT" => Signal::SIGQUIT,
        "HUP" => Signal::SIGHUP,
        "KILL" => Signal::SIGKILL,
        "USR1" => Signal::SIGUSR1,
        "USR2" => Signal::SIGUSR2,
        _ => return Err(invalid(section, "stopsignal", "unknown signal name")),
    };
    Ok(signal)
}

fn invalid(section: &str, key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_command_handles_quoting() {
        assert_eq!(
            split_command(r#"/bin/sh -c "echo 'a b'""#),
            vec!["/bin/sh", "-c", "echo 'a b'"]
        );
        assert_eq!(split_command("worker  --queue   all"), vec![
            "worker", "--queue", "all"
        ]);
        assert_eq!(split_command("echo a\\ b"), vec!["echo", "a b"]);
        assert_eq!(split_command("echo ''"), vec!["echo", ""]);
        assert!(split_command("   ").is_empty());
    }

    #[test]
    fn environment_pairs_parse() {
        let env = parse_environment("program:x", r#"A="one two",B=plain, C="x,y""#).unwrap();
        assert_eq!(env, vec![
            ("A".to_string(), "one two".to_string()),
            ("B".to_string(), "plain".to_string()),
            ("C".to_string(), "x,y".to_string()),
        ]);
    }

    #[test]
    fn sizes_parse_with_suffixes() {
        assert_eq!(parse_size("s", "k", "1024").unwrap(), 1024);
        assert_eq!(parse_size("s", "k", "10MB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("s", "k", "0").unwrap(), 0);
        assert!(parse_size("s", "k", "lots").is_err());
    }

    #[test]
    fn signals_accept_both_spellings() {
        assert_eq!(parse_signal("s", "TERM").unwrap(), Signal::SIGTERM);
        assert_eq!(parse_signal("s", "SIGKILL").unwrap(), Signal::SIGKILL);
        assert!(parse_signal("s", "BOGUS").is_err());
    }

    #[test]
    fn expansion_substitutes_known_names() {
        let ctx = ExpansionContext {
            program_name: "worker",
            group_name: "queue",
            host_node_name: "node-1",
        };
        assert_eq!(
            ctx.expand("run --id %(program_name)s@%(host_node_name)s")
                .unwrap(),
            "run --id worker@node-1"
        );
        assert_eq!(ctx.expand("100%% done").unwrap(), "100% done");
        assert!(matches!(
            ctx.expand("%(nope)s"),
            Err(ConfigError::UnknownExpansion(_))
        ));
    }
}
