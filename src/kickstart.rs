//! Locating an `%addon` section in kickstart text.

use crate::error::AddonError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonSection {
    /// 1-based line of the `%addon` header.
    pub lineno: usize,
    /// Header tokens after the addon name.
    pub args: Vec<String>,
    pub body: String,
}

/// Finds the `%addon <name>` section. `Ok(None)` when the kickstart has none.
pub fn find_addon(text: &str, name: &str) -> Result<Option<AddonSection>, AddonError> {
    let mut found: Option<AddonSection> = None;
    let mut lines = text.lines().enumerate();

    while let Some((idx, line)) = lines.next() {
        let lineno = idx + 1;
        if !line.trim_start().starts_with("%addon") {
            continue;
        }
        let tokens = shell_split(line).map_err(|msg| AddonError::config(lineno, msg))?;
        if tokens.first().map(String::as_str) != Some("%addon") {
            continue;
        }

        let mut body = String::new();
        let mut closed = false;
        for (_, l) in lines.by_ref() {
            if l.trim() == "%end" {
                closed = true;
                break;
            }
            body.push_str(l);
            body.push('\n');
        }

        if tokens.get(1).map(String::as_str) != Some(name) {
            continue;
        }
        if !closed {
            return Err(AddonError::config(lineno, "section is missing %end"));
        }
        if found.is_some() {
            return Err(AddonError::config(lineno, "section given more than once"));
        }
        found = Some(AddonSection {
            lineno,
            args: tokens[2..].to_vec(),
            body,
        });
    }
    Ok(found)
}

/// Splits a kickstart line the way a POSIX shell would, minus expansion.
pub fn shell_split(line: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {
                if in_token {
                    out.push(std::mem::take(&mut cur));
                    in_token = false;
                }
            }
            '#' if !in_token => break,
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => cur.push(ch),
                        None => return Err("unterminated single quote".into()),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => cur.push(ch),
                            Some(ch) => {
                                cur.push('\\');
                                cur.push(ch);
                            }
                            None => return Err("unterminated double quote".into()),
                        },
                        Some(ch) => cur.push(ch),
                        None => return Err("unterminated double quote".into()),
                    }
                }
            }
            '\\' => {
                in_token = true;
                if let Some(ch) = chars.next() {
                    cur.push(ch);
                }
            }
            ch => {
                in_token = true;
                cur.push(ch);
            }
        }
    }
    if in_token {
        out.push(cur);
    }
    Ok(out)
}
