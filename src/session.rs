use crate::error::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// The narrow view of a database session that plan analysis needs. Method flags set through
/// `set_flag` only last until the next `rollback`.
pub trait PlannerSession {
    /// Opens a scope for flag changes.
    fn begin(&mut self) -> Result<()>;

    /// Sets a planner setting such as `enable_seqscan` for the current scope.
    fn set_flag(&mut self, name: &str, enabled: bool) -> Result<()>;

    /// Returns the `EXPLAIN (FORMAT JSON)` document of `query` under the current settings. The
    /// query is planned, never executed.
    fn explain(&mut self, query: &str) -> Result<Value>;

    /// Discards every flag change made since `begin`.
    fn rollback(&mut self) -> Result<()>;
}

/// A session backed by the `psql` client. Every explain runs as its own script wrapped in a
/// transaction that is rolled back, so `SET LOCAL` changes can never outlive a scope.
pub struct PsqlSession {
    psql: PathBuf,
    conninfo: String,
    pending: Vec<(String, bool)>,
}

impl PsqlSession {
    pub fn new(conninfo: impl Into<String>) -> Self {
        Self {
            psql: PathBuf::from("psql"),
            conninfo: conninfo.into(),
            pending: vec![],
        }
    }

    pub fn with_psql(mut self, psql: PathBuf) -> Self {
        self.psql = psql;
        self
    }

    fn script(&self, query: &str) -> String {
        let mut script = String::from("BEGIN;\n");
        for (name, enabled) in &self.pending {
            script.push_str(&format!(
                "SET LOCAL {} = {};\n",
                name,
                if *enabled { "on" } else { "off" }
            ));
        }
        script.push_str(&format!("EXPLAIN (FORMAT JSON) {};\nROLLBACK;\n", query));
        script
    }
}

impl PlannerSession for PsqlSession {
    fn begin(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn set_flag(&mut self, name: &str, enabled: bool) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::PlannerRequest(format!(
                "not a planner setting name: {}",
                name
            )));
        }
        self.pending.push((name.to_string(), enabled));
        Ok(())
    }

    fn explain(&mut self, query: &str) -> Result<Value> {
        let script = self.script(query);
        debug!("running psql script:\n{}", script);

        let mut child = Command::new(&self.psql)
            .args([
                "--no-psqlrc",
                "--quiet",
                "--tuples-only",
                "--no-align",
                "--set",
                "ON_ERROR_STOP=1",
                "--dbname",
                self.conninfo.as_str(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                Error::PlannerRequest(format!("could not start {}: {}", self.psql.display(), err))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|err| Error::PlannerRequest(format!("could not write to psql: {}", err)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| Error::PlannerRequest(format!("psql did not finish: {}", err)))?;
        if !output.status.success() {
            return Err(Error::PlannerRequest(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim()).map_err(|err| {
            Error::PlannerRequest(format!("could not read explain output: {}", err))
        })
    }

    fn rollback(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }
}

/// Plans captured from a planner: the plan under default settings plus the plans obtained with
/// particular sets of disabled flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanFixture {
    pub default: Value,
    #[serde(default)]
    pub configurations: Vec<RecordedPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedPlan {
    /// Names of the settings that were turned off, e.g. `enable_hashjoin`.
    pub disabled: BTreeSet<String>,
    pub plan: Value,
}

impl PlanFixture {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn lookup(&self, disabled: &BTreeSet<String>) -> &Value {
        if disabled.is_empty() {
            return &self.default;
        }
        self.configurations
            .iter()
            .find(|recorded| &recorded.disabled == disabled)
            .map(|recorded| &recorded.plan)
            .unwrap_or(&self.default)
    }
}

/// Tracks which flags are off in the current scope.
#[derive(Default)]
struct FlagScope {
    disabled: BTreeSet<String>,
}

impl FlagScope {
    fn set(&mut self, name: &str, enabled: bool) {
        if enabled {
            self.disabled.remove(name);
        } else {
            self.disabled.insert(name.to_string());
        }
    }
}

/// Replays a `PlanFixture`. Configurations that were never recorded are answered with the default
/// plan, i.e. they are assumed not to change the planner's choice.
pub struct RecordedSession {
    fixture: PlanFixture,
    scope: FlagScope,
}

impl RecordedSession {
    pub fn new(fixture: PlanFixture) -> Self {
        Self {
            fixture,
            scope: Default::default(),
        }
    }
}

impl PlannerSession for RecordedSession {
    fn begin(&mut self) -> Result<()> {
        self.scope = Default::default();
        Ok(())
    }

    fn set_flag(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.scope.set(name, enabled);
        Ok(())
    }

    fn explain(&mut self, _query: &str) -> Result<Value> {
        Ok(self.fixture.lookup(&self.scope.disabled).clone())
    }

    fn rollback(&mut self) -> Result<()> {
        self.scope = Default::default();
        Ok(())
    }
}

/// Passes every call through to another session and keeps the explain results, so that a live
/// analysis can later be replayed with `RecordedSession`.
pub struct RecordingSession<S> {
    inner: S,
    scope: FlagScope,
    fixture: PlanFixture,
}

impl<S: PlannerSession> RecordingSession<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            scope: Default::default(),
            fixture: Default::default(),
        }
    }

    pub fn into_fixture(self) -> PlanFixture {
        self.fixture
    }
}

impl<S: PlannerSession> PlannerSession for RecordingSession<S> {
    fn begin(&mut self) -> Result<()> {
        self.scope = Default::default();
        self.inner.begin()
    }

    fn set_flag(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.inner.set_flag(name, enabled)?;
        self.scope.set(name, enabled);
        Ok(())
    }

    fn explain(&mut self, query: &str) -> Result<Value> {
        let doc = self.inner.explain(query)?;
        if self.scope.disabled.is_empty() {
            self.fixture.default = doc.clone();
        } else {
            let disabled = self.scope.disabled.clone();
            self.fixture
                .configurations
                .retain(|recorded| recorded.disabled != disabled);
            self.fixture.configurations.push(RecordedPlan {
                disabled,
                plan: doc.clone(),
            });
        }
        Ok(doc)
    }

    fn rollback(&mut self) -> Result<()> {
        self.scope = Default::default();
        self.inner.rollback()
    }
}
