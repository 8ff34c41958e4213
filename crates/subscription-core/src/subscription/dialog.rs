//! `application/dialog-info+xml` bodies (RFC 4235)
//!
//! Call status reports describe the local call leg. The dialog document
//! describes the remote party, so the reported direction is inverted.

use std::fmt;
use std::fmt::Write as _;

use quick_xml::escape::escape;

use crate::events::CallStatus;
use crate::uri::strip_angle_brackets;

pub const DIALOG_INFO_NS: &str = "urn:ietf:params:xml:ns:dialog-info";

/// Dialog state token (RFC 4235 section 3.7.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Trying,
    Early,
    Confirmed,
    Rejected,
    Terminated,
}

impl DialogState {
    /// Resolve the state for a call status report.
    ///
    /// `operation` wins over `status`. Returns `None` for anything
    /// unrecognised.
    pub fn from_call_status(call: &CallStatus) -> Option<Self> {
        match call.operation.as_deref() {
            Some("initialize") => return Some(DialogState::Trying),
            Some("finalize") => return Some(DialogState::Terminated),
            _ => {}
        }
        match call.status.as_deref()? {
            "connected" | "answered" => Some(DialogState::Confirmed),
            "incoming" | "outgoing" | "calling" | "ringing" | "progressing" => {
                Some(DialogState::Early)
            }
            "redirected" => Some(DialogState::Rejected),
            "destroyed" => Some(DialogState::Terminated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialogState::Trying => "trying",
            DialogState::Early => "early",
            DialogState::Confirmed => "confirmed",
            DialogState::Rejected => "rejected",
            DialogState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of the remote party in the dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogDirection {
    Initiator,
    Recipient,
}

impl DialogDirection {
    /// Invert the direction of the observed call leg
    pub fn from_leg_direction(direction: Option<&str>) -> Option<Self> {
        match direction? {
            "incoming" => Some(DialogDirection::Initiator),
            "outgoing" => Some(DialogDirection::Recipient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialogDirection::Initiator => "initiator",
            DialogDirection::Recipient => "recipient",
        }
    }
}

/// The single `<dialog>` child of a dialog-info document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogElement<'a> {
    /// Dialog id, also used as the call-id attribute
    pub id: &'a str,
    /// Placed in both `local-tag` and `remote-tag`
    pub tag: &'a str,
    pub direction: Option<DialogDirection>,
    pub state: DialogState,
}

/// Build a full-state dialog-info document with CRLF line endings.
pub fn render_dialog_info(version: u64, entity: &str, dialog: Option<&DialogElement<'_>>) -> String {
    let mut body = String::with_capacity(256);
    body.push_str("<?xml version=\"1.0\"?>\r\n");
    let _ = write!(
        body,
        "<dialog-info xmlns=\"{}\" version=\"{}\" entity=\"{}\" notify-state=\"full\">\r\n",
        DIALOG_INFO_NS,
        version,
        escape(entity)
    );
    if let Some(dialog) = dialog {
        let id = escape(dialog.id);
        let tag = escape(dialog.tag);
        let _ = write!(
            body,
            "  <dialog id=\"{id}\" call-id=\"{id}\" local-tag=\"{tag}\" remote-tag=\"{tag}\""
        );
        if let Some(direction) = dialog.direction {
            let _ = write!(body, " direction=\"{}\"", direction.as_str());
        }
        body.push_str(">\r\n");
        let _ = write!(body, "    <state>{}</state>\r\n", dialog.state);
        let _ = write!(
            body,
            "    <remote><target uri=\"{}\"/></remote>\r\n",
            escape(strip_angle_brackets(entity))
        );
        body.push_str("  </dialog>\r\n");
    }
    body.push_str("</dialog-info>\r\n");
    body
}
