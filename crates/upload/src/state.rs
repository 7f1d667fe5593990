//! Upload state machine.
//!
//! [`next_status`] is the whole transition table. The controller never
//! assigns a status any other way.

use serde::Serialize;

/// Lifecycle of a single upload invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadStatus {
    #[default]
    Idle,
    CreatingSession,
    Uploading,
    Completing,
    Success,
    Error,
    Canceled,
    Expired,
}

impl UploadStatus {
    /// A network call for this invocation is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::CreatingSession | Self::Uploading | Self::Completing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CreatingSession => "creatingSession",
            Self::Uploading => "uploading",
            Self::Completing => "completing",
            Self::Success => "success",
            Self::Error => "error",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent {
    /// `start_upload` or `retry`.
    Start,
    /// A live session was issued.
    SessionIssued,
    /// The file goes to the API in one request, with no session.
    DirectUpload,
    /// Transfer progress; never changes the status.
    Progress,
    /// All bytes reached storage.
    TransferDone,
    /// The completion call returned a file record.
    Completed,
    /// The user canceled.
    Cancel,
    /// The session is past its expiry buffer, detected locally or reported
    /// by an endpoint.
    Expire,
    /// Any other failure.
    Failed,
    /// `reset`.
    Reset,
}

/// Returns the status after `event`, or `None` if the event does not apply
/// in `status` and must be ignored.
pub fn next_status(status: UploadStatus, event: UploadEvent) -> Option<UploadStatus> {
    use UploadEvent as E;
    use UploadStatus as S;

    match (status, event) {
        (_, E::Start) => Some(S::CreatingSession),
        (_, E::Reset) => Some(S::Idle),
        (S::CreatingSession, E::SessionIssued | E::DirectUpload) => Some(S::Uploading),
        (S::Uploading, E::Progress) => Some(S::Uploading),
        (S::Uploading, E::TransferDone) => Some(S::Completing),
        (S::Completing, E::Completed) => Some(S::Success),
        (s, E::Cancel) if s.is_in_flight() => Some(S::Canceled),
        (s, E::Expire) if s.is_in_flight() => Some(S::Expired),
        (s, E::Failed) if s.is_in_flight() => Some(S::Error),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use UploadEvent as E;
    use UploadStatus as S;

    const ALL: [UploadStatus; 8] = [
        S::Idle,
        S::CreatingSession,
        S::Uploading,
        S::Completing,
        S::Success,
        S::Error,
        S::Canceled,
        S::Expired,
    ];

    #[test]
    fn happy_path() {
        let mut status = S::Idle;
        for event in [E::Start, E::SessionIssued, E::TransferDone, E::Completed] {
            status = next_status(status, event).unwrap();
        }
        assert_eq!(status, S::Success);
    }

    #[test]
    fn start_reenters_from_any_state() {
        for s in ALL {
            assert_eq!(next_status(s, E::Start), Some(S::CreatingSession));
        }
    }

    #[test]
    fn cancel_only_while_in_flight() {
        for s in ALL {
            let expected = s.is_in_flight().then_some(S::Canceled);
            assert_eq!(next_status(s, E::Cancel), expected, "from {s:?}");
        }
    }

    #[test]
    fn terminal_states_ignore_late_results() {
        for s in [S::Success, S::Error, S::Canceled, S::Expired] {
            for e in [
                E::SessionIssued,
                E::DirectUpload,
                E::TransferDone,
                E::Completed,
                E::Failed,
                E::Expire,
            ] {
                assert_eq!(next_status(s, e), None, "{e:?} from {s:?}");
            }
        }
    }

    #[test]
    fn progress_does_not_change_status() {
        assert_eq!(next_status(S::Uploading, E::Progress), Some(S::Uploading));
        assert_eq!(next_status(S::Completing, E::Progress), None);
    }

    #[test]
    fn expiry_from_every_phase() {
        for s in [S::CreatingSession, S::Uploading, S::Completing] {
            assert_eq!(next_status(s, E::Expire), Some(S::Expired));
        }
    }

    #[test]
    fn direct_upload_skips_the_session() {
        let mut status = S::Idle;
        for event in [E::Start, E::DirectUpload, E::TransferDone, E::Completed] {
            status = next_status(status, event).unwrap();
        }
        assert_eq!(status, S::Success);
        assert_eq!(next_status(S::Uploading, E::DirectUpload), None);
    }

    #[test]
    fn phases_cannot_be_skipped() {
        assert_eq!(next_status(S::CreatingSession, E::TransferDone), None);
        assert_eq!(next_status(S::Uploading, E::Completed), None);
        assert_eq!(next_status(S::Idle, E::SessionIssued), None);
    }
}
