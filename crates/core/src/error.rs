use std::path::PathBuf;

/// Errors raised while loading or validating a rule table.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The rule table file could not be read.
    #[error("failed to read rule table '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rule table is not valid TOML or does not match the expected shape.
    #[error("failed to parse rule table: {0}")]
    Parse(#[from] toml::de::Error),

    /// A subject type key was empty.
    #[error("rule table contains an empty subject type")]
    EmptySubjectType,

    /// A terminal status declares outgoing transitions.
    #[error("subject '{subject_type}': terminal status '{status}' has outgoing transitions")]
    TerminalHasTransitions {
        subject_type: String,
        status: String,
    },
}
