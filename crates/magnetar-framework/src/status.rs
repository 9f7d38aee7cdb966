use std::fmt;
use std::time::Duration;

/// Outcome code for a phase-level plugin call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The plugin is satisfied; proceed
    Success,
    /// The plugin declines to participate for this pod/node
    Skip,
    /// Expected negative decision: this pod/node combination does not fit
    Unschedulable,
    /// Unexpected failure inside the plugin or a collaborator
    Error,
    /// Permit-only: suspend the pod pending external approval
    Wait,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Success => "Success",
            Code::Skip => "Skip",
            Code::Unschedulable => "Unschedulable",
            Code::Error => "Error",
            Code::Wait => "Wait",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a single plugin call at one extension point.
///
/// Carries a code, a human-readable reason, the name of the producing plugin
/// (attributed by the runner), and - for `Wait` only - the suspension
/// timeout.
#[derive(Debug, Clone)]
pub struct Status {
    code: Code,
    reason: String,
    plugin: Option<String>,
    timeout: Option<Duration>,
}

impl Status {
    /// Create a Success status
    pub fn success() -> Self {
        Self {
            code: Code::Success,
            reason: String::new(),
            plugin: None,
            timeout: None,
        }
    }

    /// Create a Skip status
    pub fn skip() -> Self {
        Self {
            code: Code::Skip,
            reason: String::new(),
            plugin: None,
            timeout: None,
        }
    }

    /// Create an Unschedulable status with a reason
    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self {
            code: Code::Unschedulable,
            reason: reason.into(),
            plugin: None,
            timeout: None,
        }
    }

    /// Create an Error status with a reason
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            code: Code::Error,
            reason: reason.into(),
            plugin: None,
            timeout: None,
        }
    }

    /// Create a Wait status with the suspension timeout.
    ///
    /// Only Permit plugins may return this; the timeout bounds how long the
    /// pod parks in the waiting set before the wait is treated as denial.
    pub fn wait(timeout: Duration, reason: impl Into<String>) -> Self {
        Self {
            code: Code::Wait,
            reason: reason.into(),
            plugin: None,
            timeout: Some(timeout),
        }
    }

    /// Attribute this status to the plugin that produced it
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// The Wait timeout; `None` for every other code
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Success and Skip both count as success for aggregation
    pub fn is_success(&self) -> bool {
        matches!(self.code, Code::Success | Code::Skip)
    }

    pub fn is_skip(&self) -> bool {
        self.code == Code::Skip
    }

    pub fn is_wait(&self) -> bool {
        self.code == Code::Wait
    }

    pub fn is_error(&self) -> bool {
        self.code == Code::Error
    }

    pub fn is_unschedulable(&self) -> bool {
        self.code == Code::Unschedulable
    }

    /// Reason string prefixed with the producing plugin, for diagnostics
    pub fn message(&self) -> String {
        match self.plugin.as_deref() {
            Some(plugin) if self.reason.is_empty() => format!("[{}] {}", plugin, self.code),
            Some(plugin) => format!("[{}] {}", plugin, self.reason),
            None if self.reason.is_empty() => self.code.to_string(),
            None => self.reason.clone(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message())
        }
    }
}
