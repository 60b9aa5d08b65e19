//! Upload state machine as an explicit transition table.
//!
//! Pure logic, no I/O. The service asks `transition` for the next state before
//! touching anything, so a rejected event leaves the session untouched.

use serde::Serialize;

use crate::common::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadState {
    #[default]
    Initialized,
    ReadyForNextFile,
    Uploading,
    /// Every declared file of the batch has been committed.
    Finished,
    Aborted,
}

impl UploadState {
    /// Nothing left to abort.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Finished | UploadState::Aborted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent {
    DefineParameters { file_count: usize },
    StartUploading,
    UploadBlock { last: bool, files_remaining: usize },
    Cancel,
    Finish,
}

/// Result of feeding an event to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(UploadState),
    /// Event is absorbed without effect (blocks racing a cancel, repeated cancels).
    Ignore,
}

/// States from which `event` is accepted. Used for error reporting.
pub fn accepted_from(event: UploadEvent) -> Vec<UploadState> {
    use UploadState::*;
    match event {
        UploadEvent::DefineParameters { .. } => vec![Initialized],
        UploadEvent::StartUploading => vec![ReadyForNextFile],
        UploadEvent::UploadBlock { .. } => vec![Uploading, Aborted],
        UploadEvent::Cancel | UploadEvent::Finish => {
            vec![Initialized, ReadyForNextFile, Uploading, Finished, Aborted]
        }
    }
}

pub fn transition(from: UploadState, event: UploadEvent) -> Result<Transition, AppError> {
    use UploadState::*;

    let next = match (from, event) {
        (Initialized, UploadEvent::DefineParameters { file_count: 0 }) => Transition::To(Finished),
        (Initialized, UploadEvent::DefineParameters { .. }) => Transition::To(ReadyForNextFile),
        (ReadyForNextFile, UploadEvent::StartUploading) => Transition::To(Uploading),
        (Uploading, UploadEvent::UploadBlock { last: false, .. }) => Transition::To(Uploading),
        (Uploading, UploadEvent::UploadBlock { last: true, files_remaining: 0 }) => {
            Transition::To(Finished)
        }
        (Uploading, UploadEvent::UploadBlock { last: true, .. }) => {
            Transition::To(ReadyForNextFile)
        }
        (Aborted, UploadEvent::UploadBlock { .. }) => Transition::Ignore,
        (state, UploadEvent::Cancel) if state.is_terminal() => Transition::Ignore,
        (_, UploadEvent::Cancel) => Transition::To(Aborted),
        (_, UploadEvent::Finish) => Transition::To(Initialized),
        (actual, event) => {
            return Err(AppError::ProtocolState {
                expected: accepted_from(event),
                actual,
            })
        }
    };

    Ok(next)
}

/// Guard for calls that are not themselves upload events (e.g. downloads).
pub fn require_state(actual: UploadState, expected: &[UploadState]) -> Result<(), AppError> {
    if expected.contains(&actual) {
        Ok(())
    } else {
        Err(AppError::ProtocolState {
            expected: expected.to_vec(),
            actual,
        })
    }
}
