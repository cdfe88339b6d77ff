// SPDX-License-Identifier: MIT

//! Error taxonomy (§7): configuration errors are fatal at load time;
//! runtime errors are contained to the program or subsystem that raised
//! them and never abort the rest of the graph.

use thiserror::Error;

/// Errors detected while building the program graph from configuration.
/// All of these are fatal: Shepherd refuses to start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate program name: {0}")]
    DuplicateProgram(String),

    #[error("program {program}: log_states/file_states declares reserved state name {name:?}")]
    ReservedStateName { program: String, name: String },

    #[error("program {program}: dependency on unknown peer {peer:?}")]
    UnknownPeer { program: String, peer: String },

    #[error(
        "program {program}: dependency on state {state:?} of peer {peer:?}, which {peer:?} can never produce"
    )]
    UnknownPeerState {
        program: String,
        peer: String,
        state: String,
    },

    #[error("dependency graph contains a cycle: {0}")]
    DependencyCycle(String),

    #[error("program {program}: file_states.path is set without any patterns")]
    EmptyFileStatePatterns { program: String },

    #[error(
        "duplicate log path {path:?}: written by both {first:?} and {second:?}"
    )]
    DuplicateLogPath {
        path: String,
        first: String,
        second: String,
    },

    #[error("success_criteria references unknown program {0:?}")]
    UnknownSuccessCriteriaProgram(String),

    #[error("success_criteria references state {state:?} that {program:?} can never produce")]
    UnknownSuccessCriteriaState { program: String, state: String },

    #[error("{0}")]
    Invalid(String),
}

/// Errors raised during the run that are contained rather than fatal,
/// surfaced through logging and (where relevant) a program's own terminal
/// classification.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("program {program}: failed to spawn {command:?}: {source}")]
    Spawn {
        program: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("program {program}: failed to open log file {path:?}: {source}")]
    LogOpen {
        program: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("program {program}: stream read error: {source}")]
    StreamRead {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state-times artifact to {path:?}: {source}")]
    ArtifactWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
