use crate::config::Config;
use crate::core::task::WorkerKind;

/// An external worker command resolved for one worker tag.
///
/// The runtime behind the command is opaque to the engine; parallx only
/// hands it a task scope and waits for the exit status.
pub struct Worker {
    kind: WorkerKind,
    base_command: Vec<String>,
}

impl Worker {
    pub fn from_config(config: &Config, kind: WorkerKind) -> Self {
        Self {
            kind,
            base_command: config
                .worker_command(kind.as_str())
                .split_whitespace()
                .map(String::from)
                .collect(),
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn binary(&self) -> &str {
        self.base_command
            .first()
            .map(|s| s.as_str())
            .unwrap_or("claude")
    }

    /// Full argv for running the given task scope.
    pub fn command(&self, scope: Option<&str>) -> Vec<String> {
        let mut cmd = self.base_command.clone();
        if let Some(s) = scope {
            cmd.push(s.to_string());
        }
        cmd
    }

    pub fn is_available(&self) -> bool {
        which::which(self.binary()).is_ok()
    }
}
