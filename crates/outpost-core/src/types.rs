//! # Wire Types
//!
//! The JSON shapes exchanged between the edge agent and the authority, and
//! the shape of the edge's on-disk files.
//!
//! ## Event JSON
//! ```text
//! {
//!   "uid": "4f1c...",            ← globally unique, dedup key
//!   "timestamp": 1718000000,     ← unix seconds
//!   "fob_swipe": {"fob_id": 123},
//!   "printer_event": null        ← exactly one of the two is set
//! }
//! ```
//!
//! ## Snapshot JSON
//! ```text
//! {"revision": 2, "enabled_fobs": [123]}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Monotonic version of the authority's derived state.
pub type Revision = i64;

// =============================================================================
// State Snapshot
// =============================================================================

/// The enabled credential set paired with the revision that describes it.
///
/// Never stored server-side; the edge keeps the last one in `state.json`.
///
/// Deserializing goes through [`StateSnapshot::new`], so a snapshot read
/// off the wire or from disk is always sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawSnapshot")]
pub struct StateSnapshot {
    pub revision: Revision,

    /// Sorted ascending, no duplicates.
    pub enabled_fobs: Vec<i64>,
}

#[derive(Deserialize)]
struct RawSnapshot {
    revision: Revision,
    #[serde(default)]
    enabled_fobs: Vec<i64>,
}

impl From<RawSnapshot> for StateSnapshot {
    fn from(raw: RawSnapshot) -> Self {
        StateSnapshot::new(raw.revision, raw.enabled_fobs)
    }
}

impl StateSnapshot {
    pub fn new(revision: Revision, mut enabled_fobs: Vec<i64>) -> Self {
        enabled_fobs.sort_unstable();
        enabled_fobs.dedup();
        StateSnapshot {
            revision,
            enabled_fobs,
        }
    }

    /// Returns true if the given fob is currently allowed in.
    pub fn is_enabled(&self, fob_id: i64) -> bool {
        self.enabled_fobs.binary_search(&fob_id).is_ok()
    }
}

// =============================================================================
// Events
// =============================================================================

/// A badge presented to a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FobSwipe {
    pub fob_id: i64,
}

/// A status change reported by a printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterEvent {
    pub printer_name: String,

    /// Unix seconds at which the running job is expected to finish.
    #[serde(default)]
    pub job_finished_at: Option<i64>,

    #[serde(default)]
    pub error_code: String,
}

/// An immutable, uid-tagged record of something that happened at the edge.
///
/// Exactly one of `fob_swipe` / `printer_event` is populated; see
/// [`Event::validate`](crate::validation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub timestamp: i64,

    #[serde(default)]
    pub fob_swipe: Option<FobSwipe>,

    #[serde(default)]
    pub printer_event: Option<PrinterEvent>,
}

/// Borrowed view of whichever payload an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPayload<'a> {
    FobSwipe(&'a FobSwipe),
    PrinterEvent(&'a PrinterEvent),
}

impl Event {
    /// Builds a fob swipe event.
    pub fn fob_swipe(uid: impl Into<String>, timestamp: i64, fob_id: i64) -> Self {
        Event {
            uid: uid.into(),
            timestamp,
            fob_swipe: Some(FobSwipe { fob_id }),
            printer_event: None,
        }
    }

    /// Builds a printer status event.
    pub fn printer(uid: impl Into<String>, timestamp: i64, printer: PrinterEvent) -> Self {
        Event {
            uid: uid.into(),
            timestamp,
            fob_swipe: None,
            printer_event: Some(printer),
        }
    }

    /// Returns the populated payload, or `None` when the event is malformed.
    pub fn payload(&self) -> Option<EventPayload<'_>> {
        match (&self.fob_swipe, &self.printer_event) {
            (Some(swipe), None) => Some(EventPayload::FobSwipe(swipe)),
            (None, Some(printer)) => Some(EventPayload::PrinterEvent(printer)),
            _ => None,
        }
    }
}

// =============================================================================
// Newline-Delimited JSON
// =============================================================================

/// Encodes events as one JSON object per line.
pub fn encode_event_lines<'a>(
    events: impl IntoIterator<Item = &'a Event>,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut body = Vec::new();
    for event in events {
        serde_json::to_writer(&mut body, event)?;
        body.push(b'\n');
    }
    Ok(body)
}

/// Decodes a stream of whitespace-separated JSON events.
///
/// Any syntax error rejects the whole stream.
pub fn decode_event_lines(body: &[u8]) -> Result<Vec<Event>, CoreError> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<Event>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::MalformedStream(e.to_string()))
}
