use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use teloxide::types::{ChatId, FileId, MediaGroupId, MessageId};
use tracing::debug;

/// One resolution variant of an inbound photo.
#[derive(Debug, Clone)]
pub struct PhotoCandidate {
    pub width: u32,
    pub height: u32,
    pub file_id: FileId,
}

impl PhotoCandidate {
    fn pixel_area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A delivered photo message, immutable once built.
///
/// `source_chat_*` carry provenance: for forwarded messages they describe the
/// forward origin, otherwise the chat the message arrived in. `chat_id` and
/// `message_id` always point at the arrival message so the sender can be
/// acknowledged.
#[derive(Debug, Clone)]
pub struct InboundPhotoEvent {
    pub group_id: Option<MediaGroupId>,
    pub candidates: Vec<PhotoCandidate>,
    pub caption: Option<String>,
    pub sender_label: String,
    pub source_chat_id: i64,
    pub source_chat_name: String,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub received_at: DateTime<Utc>,
}

/// The single representative chosen from a media group (or from a lone photo).
#[derive(Debug, Clone)]
pub struct ConsolidatedItem {
    pub best: PhotoCandidate,
    pub caption: Option<String>,
    pub sender_label: String,
    pub source_chat_id: i64,
    pub source_chat_name: String,
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Outcome of submitting one inbound event.
#[derive(Debug)]
pub enum Submission {
    /// Ungrouped event, consolidated synchronously.
    Ready(ConsolidatedItem),
    /// Buffered into a media group; `first` is set when this event created
    /// the buffer and the caller must arm the quiescence timer.
    Buffered { first: bool },
    /// The group was already finalized; the event is a late straggler.
    Duplicate,
    /// Nothing usable in the event (no candidates).
    Skipped,
}

struct Inner {
    groups: HashMap<MediaGroupId, Vec<InboundPhotoEvent>>,
    finalized: HashMap<MediaGroupId, Instant>,
}

/// Buffers media-group events and emits exactly one consolidated item per
/// group id.
///
/// The quiescence timer itself lives with the caller (a one-shot task per
/// first-seen group); this type only guarantees that `finalize` is idempotent
/// and that late submissions for a finalized group are rejected. All state
/// sits behind one mutex, so a timer racing a late submission always observes
/// a consistent finalized set.
pub struct GroupConsolidator {
    inner: Mutex<Inner>,
    finalized_ttl: Duration,
}

impl GroupConsolidator {
    pub fn new(finalized_ttl: Duration) -> Self {
        GroupConsolidator {
            inner: Mutex::new(Inner {
                groups: HashMap::new(),
                finalized: HashMap::new(),
            }),
            finalized_ttl,
        }
    }

    pub fn submit(&self, event: InboundPhotoEvent) -> Submission {
        let Some(group_id) = event.group_id.clone() else {
            return match consolidate(vec![event]) {
                Some(item) => Submission::Ready(item),
                None => Submission::Skipped,
            };
        };

        let mut inner = self.inner.lock();
        if inner.finalized.contains_key(&group_id) {
            return Submission::Duplicate;
        }
        let buffer = inner.groups.entry(group_id).or_default();
        buffer.push(event);
        Submission::Buffered {
            first: buffer.len() == 1,
        }
    }

    /// Finalizes a group once its quiescence window has elapsed.
    ///
    /// Returns the consolidated item on the first call for a group id and
    /// `None` on every later call, even if the buffer held no usable
    /// candidates. Stale finalized ids are swept out here so the seen-set
    /// stays bounded.
    pub fn finalize(&self, group_id: &MediaGroupId) -> Option<ConsolidatedItem> {
        let mut inner = self.inner.lock();
        if inner.finalized.contains_key(group_id) {
            return None;
        }
        let events = inner.groups.remove(group_id).unwrap_or_default();
        if let Some(first) = events.first() {
            debug!(
                "finalizing media group of {} event(s), first received at {}",
                events.len(),
                first.received_at
            );
        }

        let now = Instant::now();
        inner.finalized.insert(group_id.clone(), now);
        let ttl = self.finalized_ttl;
        inner
            .finalized
            .retain(|_, finalized_at| now.duration_since(*finalized_at) < ttl);

        consolidate(events)
    }
}

/// Picks the candidate with the largest pixel area across all events.
///
/// Strict comparison keeps the earliest-arriving candidate on ties. Metadata
/// comes from the event that owns the winning candidate; the caption falls
/// back to the first captioned event in arrival order, since Telegram attaches
/// an album caption to only one of its messages.
fn consolidate(events: Vec<InboundPhotoEvent>) -> Option<ConsolidatedItem> {
    let mut best: Option<(usize, usize, u64)> = None;
    for (event_index, event) in events.iter().enumerate() {
        for (candidate_index, candidate) in event.candidates.iter().enumerate() {
            let area = candidate.pixel_area();
            if best.map_or(true, |(_, _, best_area)| area > best_area) {
                best = Some((event_index, candidate_index, area));
            }
        }
    }

    let (event_index, candidate_index, _) = best?;
    let caption = events[event_index]
        .caption
        .clone()
        .or_else(|| events.iter().find_map(|event| event.caption.clone()));
    let event = &events[event_index];
    Some(ConsolidatedItem {
        best: event.candidates[candidate_index].clone(),
        caption,
        sender_label: event.sender_label.clone(),
        source_chat_id: event.source_chat_id,
        source_chat_name: event.source_chat_name.clone(),
        chat_id: event.chat_id,
        message_id: event.message_id,
    })
}
