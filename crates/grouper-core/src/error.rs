use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrouperError {
    #[error("config error: {0}")]
    Config(String),

    #[error("GitHub API rate limit exceeded on {url}")]
    RateLimited { url: String },

    #[error("GitHub responded {status} on {url}: {body}")]
    GitHubStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("giving up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("directory lookup failed for group '{group}': {reason}")]
    Directory { group: String, reason: String },

    #[error("could not create team for project '{project}': {reason}")]
    TeamCreation { project: String, reason: String },

    #[error("unexpected GitHub payload from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("MFA feed error: {0}")]
    MfaFeed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// How far an error is allowed to propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retries ran out; only the project that needed the data is skipped.
    Transient,
    /// The directory had nothing usable for the project. Skip, never mutate.
    MissingAuthority,
    /// A required team could not be created. Aborts the run.
    Setup,
    /// Anything else. Aborts the run.
    Fatal,
}

impl GrouperError {
    pub fn class(&self) -> ErrorClass {
        match self {
            GrouperError::RetriesExhausted { .. } => ErrorClass::Transient,
            GrouperError::Directory { .. } => ErrorClass::MissingAuthority,
            GrouperError::TeamCreation { .. } => ErrorClass::Setup,
            _ => ErrorClass::Fatal,
        }
    }

    /// True when the error should stop only the current project.
    pub fn is_project_scoped(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Transient | ErrorClass::MissingAuthority
        )
    }
}

pub type Result<T> = std::result::Result<T, GrouperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_match_propagation_policy() {
        let transient = GrouperError::RetriesExhausted {
            url: "https://example.test".into(),
            attempts: 5,
        };
        assert_eq!(transient.class(), ErrorClass::Transient);
        assert!(transient.is_project_scoped());

        let dir = GrouperError::Directory {
            group: "foo".into(),
            reason: "bind failed".into(),
        };
        assert!(dir.is_project_scoped());

        let setup = GrouperError::TeamCreation {
            project: "foo".into(),
            reason: "403".into(),
        };
        assert_eq!(setup.class(), ErrorClass::Setup);
        assert!(!setup.is_project_scoped());

        let limited = GrouperError::RateLimited {
            url: "https://example.test".into(),
        };
        assert_eq!(limited.class(), ErrorClass::Fatal);
    }
}
