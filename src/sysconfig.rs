//! Shell-style `KEY=value` files under /etc/sysconfig.
//!
//! Only the `OPTIONS` assignment is ever rewritten. Every other line,
//! comments and blank lines included, is written back byte-for-byte.

use std::{path::Path, sync::LazyLock};

use anyhow::{Context, Result};
use regex::Regex;

use crate::{logging::AddonLog, tooling::FsPort};

pub const OPTIONS_KEY: &str = "OPTIONS";

static OPTIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<lead>[ \t]*(?:export[ \t]+)?OPTIONS=)(?P<val>.*)$").expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

impl Quote {
    fn wrap(self, v: &str) -> String {
        match self {
            Quote::None => v.to_string(),
            Quote::Single => format!("'{v}'"),
            Quote::Double => format!("\"{v}\""),
        }
    }
}

/// Splits the right-hand side of an assignment into value, quote style and
/// the trailing text (blanks, `# comment`) that a rewrite must keep.
fn split_value(raw: &str) -> (&str, Quote, &str) {
    for (q, kind) in [('\'', Quote::Single), ('"', Quote::Double)] {
        if let Some(inner) = raw.strip_prefix(q)
            && let Some(end) = inner.find(q)
        {
            let rest = &inner[end + 1..];
            let tail = rest.trim_start();
            if tail.is_empty() || tail.starts_with('#') {
                return (&inner[..end], kind, rest);
            }
        }
    }
    let cut = raw
        .char_indices()
        .find(|&(i, c)| c == '#' && raw[..i].ends_with([' ', '\t']))
        .map_or(raw.len(), |(i, _)| i);
    let value = raw[..cut].trim_end();
    (value, Quote::None, &raw[value.len()..])
}

/// Value of the last `OPTIONS=` assignment, unquoted. Empty when absent.
pub fn read_options(text: &str) -> String {
    text.lines()
        .filter_map(|l| OPTIONS_RE.captures(l.trim_end_matches('\r')))
        .last()
        .map(|c| split_value(c.name("val").map_or("", |m| m.as_str())).0.to_string())
        .unwrap_or_default()
}

/// Rewrites the OPTIONS value of `text`.
///
/// `transform` gets the current value (empty if the key is missing) and
/// `append` tokens are space-joined onto the result.
pub fn merge_text(
    text: &str,
    transform: impl Fn(&str) -> String,
    append: Option<&[String]>,
) -> String {
    let mut lines: Vec<&str> = text.split_inclusive('\n').collect();
    let target = lines
        .iter()
        .copied()
        .enumerate()
        .filter_map(|(idx, line)| {
            let (body, eol) = strip_eol(line);
            OPTIONS_RE.captures(body).map(|caps| (idx, caps, eol))
        })
        .last();

    let (current, quote, lead, tail, eol) = match &target {
        Some((_, caps, eol)) => {
            let (val, quote, tail) = split_value(caps.name("val").map_or("", |m| m.as_str()));
            let lead = caps.name("lead").map_or("", |m| m.as_str());
            (val.to_string(), quote, lead.to_string(), tail.to_string(), *eol)
        }
        None => (
            String::new(),
            Quote::Single,
            format!("{OPTIONS_KEY}="),
            String::new(),
            "\n",
        ),
    };

    let mut value = transform(&current);
    if let Some(extra) = append.filter(|a| !a.is_empty()) {
        if !value.is_empty() {
            value.push(' ');
        }
        value.push_str(&extra.join(" "));
    }
    // a bare value with blanks would split into separate shell words
    let quote = match quote {
        Quote::None if value.contains([' ', '\t']) => Quote::Single,
        q => q,
    };
    let new_line = format!("{lead}{}{tail}{eol}", quote.wrap(&value));

    match target.map(|(idx, _, _)| idx) {
        Some(idx) => {
            lines[idx] = &new_line;
            lines.concat()
        }
        None => {
            let mut out = text.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&new_line);
            out
        }
    }
}

fn strip_eol(line: &str) -> (&str, &'static str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn try_merge(
    fs: &dyn FsPort,
    path: &Path,
    transform: &dyn Fn(&str) -> String,
    append: Option<&[String]>,
) -> Result<String> {
    let text = fs.read_to_string(path)?;
    let merged = merge_text(&text, transform, append);
    fs.write(path, &merged)
        .with_context(|| format!("update {OPTIONS_KEY} in {}", path.display()))?;
    Ok(read_options(&merged))
}

/// Merges daemon options into `path`. I/O failures are logged, never raised.
pub fn merge_options(
    fs: &dyn FsPort,
    path: &Path,
    transform: &dyn Fn(&str) -> String,
    append: Option<&[String]>,
    log: &dyn AddonLog,
) {
    match try_merge(fs, path, transform, append) {
        Ok(value) => log.debug(&format!(
            "{OPTIONS_KEY} in {} is now {value:?}",
            path.display()
        )),
        Err(e) => log.warn(&format!(
            "failed to update {}, skipping: {e:#}",
            path.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::{logging::testing::RecordingLog, tooling::FsLocal};

    fn ident(s: &str) -> String {
        s.to_string()
    }

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn append_keeps_other_keys() {
        let text = "OPTIONS=\"old\"\nOTHER=\"keep\"\n";
        let out = merge_text(text, ident, Some(&args(&["--foo"])));
        assert_eq!(out, "OPTIONS=\"old --foo\"\nOTHER=\"keep\"\n");
        assert_eq!(read_options(&out), "old --foo");
    }

    #[test]
    fn identity_without_append_is_byte_identical() {
        let text = "# /etc/sysconfig/docker\n\nOPTIONS='--selinux-enabled --log-driver=journald'\n\
                    DOCKER_CERT_PATH=/etc/docker\n# INSECURE_REGISTRY='--insecure-registry'\n";
        assert_eq!(merge_text(text, ident, None), text);
        assert_eq!(merge_text(text, ident, Some(&[])), text);
    }

    #[test]
    fn overlay_transform_applies_to_value_only() {
        let text = "OPTIONS='--selinux-enabled --icc=false'\nSELINUX_NOTE='--selinux-enabled'\n";
        let out = merge_text(text, |s| s.replace("--selinux-enabled", ""), None);
        assert_eq!(
            out,
            "OPTIONS=' --icc=false'\nSELINUX_NOTE='--selinux-enabled'\n"
        );
    }

    #[test]
    fn trailing_comment_is_kept_outside_the_value() {
        let out = merge_text(
            "OPTIONS='--selinux-enabled' # default\n",
            ident,
            Some(&args(&["--foo"])),
        );
        assert_eq!(out, "OPTIONS='--selinux-enabled --foo' # default\n");
        assert_eq!(read_options(&out), "--selinux-enabled --foo");

        let out = merge_text("OPTIONS=-D # debug\n", ident, Some(&args(&["--foo"])));
        assert_eq!(out, "OPTIONS='-D --foo' # debug\n");

        let text = "OPTIONS=\"-D\"   # keep spacing\n";
        assert_eq!(merge_text(text, ident, None), text);
    }

    #[test]
    fn bare_value_gains_quotes_when_it_grows() {
        let out = merge_text("OPTIONS=--selinux-enabled\n", ident, Some(&args(&["--foo"])));
        assert_eq!(out, "OPTIONS='--selinux-enabled --foo'\n");

        let text = "OPTIONS=--selinux-enabled\n";
        assert_eq!(merge_text(text, ident, None), text);
    }

    #[test]
    fn missing_key_is_added() {
        let out = merge_text("OTHER=1", ident, Some(&args(&["--foo", "--bar"])));
        assert_eq!(out, "OTHER=1\nOPTIONS='--foo --bar'\n");
        assert_eq!(read_options("OTHER=1"), "");
    }

    #[test]
    fn last_assignment_wins_and_comments_ignored() {
        let text = "#OPTIONS='commented'\nOPTIONS=a\nexport OPTIONS=b\r\nX=y\n";
        let out = merge_text(text, |s| format!("{s}!"), None);
        assert_eq!(out, "#OPTIONS='commented'\nOPTIONS=a\nexport OPTIONS=b!\r\nX=y\n");
    }

    #[test]
    fn merge_options_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("docker");
        fs::write(&path, "OPTIONS='old'\nOTHER='keep'\n").unwrap();
        let log = RecordingLog::default();

        merge_options(&FsLocal::new(), &path, &ident, Some(&args(&["--foo"])), &log);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "OPTIONS='old --foo'\nOTHER='keep'\n"
        );
        assert!(log.lines("warn").is_empty());
    }

    #[test]
    fn merge_options_missing_file_is_logged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent");
        let log = RecordingLog::default();

        merge_options(&FsLocal::new(), &path, &ident, None, &log);
        assert!(!path.exists());
        let warns = log.lines("warn");
        assert_eq!(warns.len(), 1);
        assert!(warns[0].contains("absent"), "{warns:?}");
    }
}
