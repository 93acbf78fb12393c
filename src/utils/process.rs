use std::{
    fs::File,
    path::PathBuf,
    process::{Child, Command, Stdio},
};

use anyhow::{Context, Result, bail};

use crate::utils::exec_policy;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StdioSpec {
    Inherit,
    Null,
    /// Truncate/create the file and send the stream there.
    File(PathBuf),
}

impl StdioSpec {
    fn to_stdio(&self) -> Result<Stdio> {
        Ok(match self {
            StdioSpec::Inherit => Stdio::inherit(),
            StdioSpec::Null => Stdio::null(),
            StdioSpec::File(p) => Stdio::from(
                File::create(p).with_context(|| format!("create {}", p.display()))?,
            ),
        })
    }
}

#[derive(Clone, Debug)]
pub struct CmdSpec {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    stdout: StdioSpec,
    stderr: StdioSpec,
    cwd: Option<PathBuf>,
}

impl CmdSpec {
    #[must_use]
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            stdout: StdioSpec::Inherit,
            stderr: StdioSpec::Inherit,
            cwd: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, a: impl Into<String>) -> Self {
        self.args.push(a.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, it: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(it.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.envs.push((k.into(), v.into()));
        self
    }

    #[must_use]
    pub fn stdout(mut self, s: StdioSpec) -> Self {
        self.stdout = s;
        self
    }

    #[must_use]
    pub fn stderr(mut self, s: StdioSpec) -> Self {
        self.stderr = s;
        self
    }

    #[must_use]
    pub fn cwd<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[cfg(test)]
    pub(crate) fn stdio(&self) -> (&StdioSpec, &StdioSpec) {
        (&self.stdout, &self.stderr)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.envs {
            out.push_str(&format!("{k}={} ", sh_quote(v)));
        }
        out.push_str(&sh_quote(&self.program));
        for a in &self.args {
            out.push(' ');
            out.push_str(&sh_quote(a));
        }
        out
    }

    fn to_command(&self) -> Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        if let Some(ref d) = self.cwd {
            cmd.current_dir(d);
        }
        cmd.stdin(Stdio::null());
        match (&self.stdout, &self.stderr) {
            // 2>&1 into the same file, sharing one offset
            (StdioSpec::File(out), StdioSpec::File(err)) if out == err => {
                let f = File::create(out).with_context(|| format!("create {}", out.display()))?;
                let dup = f
                    .try_clone()
                    .with_context(|| format!("dup {}", out.display()))?;
                cmd.stdout(Stdio::from(f));
                cmd.stderr(Stdio::from(dup));
            }
            (out, err) => {
                cmd.stdout(out.to_stdio()?);
                cmd.stderr(err.to_stdio()?);
            }
        }
        Ok(cmd)
    }
}

/// Handle on a process left running in the background.
pub trait Background: Send {
    fn id(&self) -> u32;
    fn kill(&mut self) -> Result<()>;
}

pub trait Runner: Send + Sync {
    /// Runs to completion; a non-zero exit is an error.
    fn run(&self, cmd: &CmdSpec) -> Result<()>;
    /// Runs to completion and returns the exit code.
    fn status(&self, cmd: &CmdSpec) -> Result<i32>;
    fn spawn(&self, cmd: &CmdSpec) -> Result<Box<dyn Background>>;
}

#[derive(Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Runner for ProcessRunner {
    fn run(&self, cmd: &CmdSpec) -> Result<()> {
        let code = self.status(cmd)?;
        if code != 0 {
            bail!("command failed: {} (exit {code})", cmd.render());
        }
        Ok(())
    }

    fn status(&self, cmd: &CmdSpec) -> Result<i32> {
        if exec_policy::is_dry_run() {
            tracing::info!("[DRY-RUN] {}", cmd.render());
            return Ok(0);
        }
        tracing::debug!("exec: {}", cmd.render());

        let status = cmd
            .to_command()?
            .status()
            .with_context(|| format!("run {}", cmd.render()))?;
        // killed by a signal
        Ok(status.code().unwrap_or(-1))
    }

    fn spawn(&self, cmd: &CmdSpec) -> Result<Box<dyn Background>> {
        if exec_policy::is_dry_run() {
            tracing::info!("[DRY-RUN] {} &", cmd.render());
            return Ok(Box::new(DryRunChild));
        }
        tracing::debug!("spawn: {}", cmd.render());

        let child = cmd
            .to_command()?
            .spawn()
            .with_context(|| format!("spawn {}", cmd.render()))?;
        Ok(Box::new(ChildHandle {
            child,
            label: cmd.program.clone(),
        }))
    }
}

struct ChildHandle {
    child: Child,
    label: String,
}

impl Background for ChildHandle {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .with_context(|| format!("kill {} (pid {})", self.label, self.child.id()))?;
        // exit status of a killed process is meaningless, only reap it
        if let Err(e) = self.child.wait() {
            tracing::debug!("reap {} (pid {}): {e}", self.label, self.child.id());
        }
        Ok(())
    }
}

struct DryRunChild;

impl Background for DryRunChild {
    fn id(&self) -> u32 {
        0
    }

    fn kill(&mut self) -> Result<()> {
        Ok(())
    }
}

fn sh_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".into();
    }
    if !s
        .bytes()
        .any(|b| b == b' ' || b == b'\'' || b == b'"' || b == b'\\')
    {
        return s.to_string();
    }
    let mut out = String::from("'");
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}
