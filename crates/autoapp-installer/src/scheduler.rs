use anyhow::{anyhow, bail, Context, Result};
use autoapp_core::AppError;
use rand::Rng;
use regex::{Regex, RegexBuilder};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

static REDIRECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ &12]*[>|<=].*").expect("redirection pattern must compile")
});

/// Recurring job table. Entry ids are case-insensitive regular
/// expressions matched against whole entries.
pub trait Scheduler {
    /// Adds `command` at `cadence`, replacing entries that match `id`
    /// (the command without redirections when `id` is `None`).
    fn add(&self, command: &str, cadence: &str, id: Option<&str>) -> Result<()>;

    /// Entries containing `filter`, ignoring case.
    fn list(&self, filter: &str) -> Result<Vec<String>>;

    /// Removes entries matching `id`; returns whether any were removed.
    fn remove(&self, id: &str) -> Result<bool>;
}

/// The command with output redirections stripped, used as its default id.
pub fn default_entry_id(command: &str) -> String {
    REDIRECTION.replace(command, "").trim().to_string()
}

/// One table line. A `?` in the cadence becomes `minute`.
pub fn render_entry(cadence: &str, minute: u8, path_env: &str, command: &str) -> String {
    let cadence = cadence.replace('?', &minute.to_string());
    format!("{cadence} PATH={path_env} {command}")
}

pub(crate) fn id_matcher(id: &str) -> Result<Regex> {
    RegexBuilder::new(id)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid entry id: {id}"))
}

pub(crate) fn without_entries(table: &str, matcher: &Regex) -> String {
    table
        .lines()
        .filter(|line| !matcher.is_match(line))
        .map(|line| format!("{line}\n"))
        .collect()
}

/// Cron-backed scheduler driving the `crontab` command.
#[derive(Debug, Clone)]
pub struct Crontab {
    path_env: String,
}

impl Crontab {
    /// `path_env` becomes the `PATH=` of every entry added.
    pub fn new(path_env: impl Into<String>) -> Self {
        Self {
            path_env: path_env.into(),
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if which::which("crontab").is_err() {
            return Err(AppError::MissingCollaborator(
                "crontab is not available. Please install cron or ensure PATH is set correctly."
                    .to_string(),
            )
            .into());
        }

        if cfg!(target_os = "macos") || which::which("pgrep").is_err() {
            return Ok(());
        }
        let running = ["cron", "crond"].iter().any(|daemon| {
            Command::new("pgrep")
                .args(["-x", daemon])
                .stdout(Stdio::null())
                .status()
                .is_ok_and(|status| status.success())
        });
        if !running {
            return Err(AppError::MissingCollaborator(
                "cron service does not seem to be running. Try starting it: sudo service cron start"
                    .to_string(),
            )
            .into());
        }
        Ok(())
    }

    fn read_table(&self) -> Result<String> {
        let output = Command::new("crontab")
            .arg("-l")
            .output()
            .context("crontab -l: command failed to start")?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab for") {
            return Ok(String::new());
        }
        bail!("crontab -l failed ({}): {}", output.status, stderr.trim())
    }

    fn write_table(&self, table: &str) -> Result<()> {
        let mut child = Command::new("crontab")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("crontab -: command failed to start")?;
        child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("crontab -: stdin is not available"))?
            .write_all(table.as_bytes())
            .context("crontab -: failed to write entries")?;
        let output = child
            .wait_with_output()
            .context("crontab -: failed to wait for completion")?;
        if !output.status.success() {
            bail!(
                "crontab - failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl Scheduler for Crontab {
    fn add(&self, command: &str, cadence: &str, id: Option<&str>) -> Result<()> {
        if command.contains('\n') {
            bail!("scheduled command must be a single line: {command:?}");
        }
        self.ensure_available()?;

        let id = id.map_or_else(|| regex::escape(&default_entry_id(command)), str::to_string);
        let matcher = id_matcher(&id)?;
        if !matcher.is_match(command) {
            bail!("entry id {id:?} does not match command {command:?}");
        }

        let minute = rand::rng().random_range(0..60);
        let mut table = without_entries(&self.read_table()?, &matcher);
        table.push_str(&render_entry(cadence, minute, &self.path_env, command));
        table.push('\n');
        self.write_table(&table)
    }

    fn list(&self, filter: &str) -> Result<Vec<String>> {
        self.ensure_available()?;
        let matcher = id_matcher(&regex::escape(filter))?;
        Ok(self
            .read_table()?
            .lines()
            .filter(|line| matcher.is_match(line))
            .map(str::to_string)
            .collect())
    }

    fn remove(&self, id: &str) -> Result<bool> {
        self.ensure_available()?;
        let matcher = id_matcher(id)?;
        let table = self.read_table()?;
        if !table.lines().any(|line| matcher.is_match(line)) {
            return Ok(false);
        }
        self.write_table(&without_entries(&table, &matcher))?;
        Ok(true)
    }
}
