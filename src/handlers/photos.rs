use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{MediaGroupId, MessageOrigin, ReplyParameters};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::grouping::{GroupConsolidator, InboundPhotoEvent, PhotoCandidate, Submission};
use crate::relay::RelayHandle;
use crate::state::AppState;

/// Entry point for every photo message. Ungrouped photos go straight to the
/// relay loop; album members are buffered and the first one arms the
/// group's one-shot quiescence timer.
pub async fn photo_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(event) = event_from_message(&message) else {
        return Ok(());
    };
    let group_id = event.group_id.clone();

    match state.consolidator.submit(event) {
        Submission::Ready(item) => {
            if !state.relay.submit_consolidated(item).await {
                warn!("relay loop is gone; dropping photo");
            }
        }
        Submission::Buffered { first: true } => {
            if let Some(group_id) = group_id {
                arm_group_timer(
                    state.consolidator.clone(),
                    state.relay.clone(),
                    group_id,
                    CONFIG.media_group_window(),
                );
            }
        }
        Submission::Buffered { first: false } => {}
        Submission::Duplicate => {
            debug!("ignoring late event for a finalized media group");
        }
        Submission::Skipped => {
            bot.send_message(message.chat.id, "Please send an image with a caption.")
                .reply_parameters(ReplyParameters::new(message.id))
                .await?;
        }
    }
    Ok(())
}

/// One-shot timer per first-seen group id. The window is anchored at the
/// first arrival and never reset, so a trickle of stragglers cannot delay
/// the group forever. `finalize` is idempotent, which absorbs the race where
/// a duplicate timer fires.
fn arm_group_timer(
    consolidator: Arc<GroupConsolidator>,
    relay: RelayHandle,
    group_id: MediaGroupId,
    window: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(window).await;
        if let Some(item) = consolidator.finalize(&group_id) {
            if !relay.submit_consolidated(item).await {
                warn!("relay loop is gone; dropping consolidated media group");
            }
        }
    });
}

fn event_from_message(message: &Message) -> Option<InboundPhotoEvent> {
    let photos = message.photo()?;
    let candidates = photos
        .iter()
        .map(|photo| PhotoCandidate {
            width: photo.width,
            height: photo.height,
            file_id: photo.file.id.clone(),
        })
        .collect();
    let (source_chat_id, source_chat_name) = source_chat(message);

    Some(InboundPhotoEvent {
        group_id: message.media_group_id().cloned(),
        candidates,
        caption: message.caption().map(|value| value.to_string()),
        sender_label: sender_label(message),
        source_chat_id,
        source_chat_name,
        chat_id: message.chat.id,
        message_id: message.id,
        received_at: Utc::now(),
    })
}

fn sender_label(message: &Message) -> String {
    if let Some(user) = message.from.as_ref() {
        if let Some(username) = &user.username {
            return username.clone();
        }
        if !user.full_name().is_empty() {
            return user.full_name();
        }
    }
    "Anonymous".to_string()
}

/// Provenance chat for the automation payload. A forwarded origin takes
/// precedence over the chat the message arrived in.
fn source_chat(message: &Message) -> (i64, String) {
    if let Some(origin) = message.forward_origin() {
        match origin {
            MessageOrigin::Channel { chat, .. } => {
                return (chat.id.0, chat.title().unwrap_or_default().to_string());
            }
            MessageOrigin::Chat { sender_chat, .. } => {
                return (
                    sender_chat.id.0,
                    sender_chat.title().unwrap_or_default().to_string(),
                );
            }
            MessageOrigin::User { sender_user, .. } => {
                return (message.chat.id.0, sender_user.full_name());
            }
            MessageOrigin::HiddenUser {
                sender_user_name, ..
            } => {
                return (message.chat.id.0, sender_user_name.clone());
            }
        }
    }
    (message.chat.id.0, direct_chat_name(message))
}

fn direct_chat_name(message: &Message) -> String {
    let chat = &message.chat;
    if let Some(title) = chat.title() {
        return title.to_string();
    }
    if let Some(username) = chat.username() {
        return username.to_string();
    }
    if let Some(first_name) = chat.first_name() {
        return first_name.to_string();
    }
    "Unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{self, RelayJob};

    use teloxide::types::{ChatId, FileId, MessageId};

    fn group_event(group: &str, width: u32, height: u32, file_id: &str) -> InboundPhotoEvent {
        InboundPhotoEvent {
            group_id: Some(MediaGroupId(group.to_string())),
            candidates: vec![PhotoCandidate {
                width,
                height,
                file_id: FileId(file_id.to_string()),
            }],
            caption: None,
            sender_label: "tester".to_string(),
            source_chat_id: 42,
            source_chat_name: "Test Chat".to_string(),
            chat_id: ChatId(42),
            message_id: MessageId(1),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn armed_timer_emits_one_item_after_the_window() {
        let consolidator = Arc::new(GroupConsolidator::new(Duration::from_secs(60)));
        let (relay, mut jobs) = relay::channel(4);
        let group = MediaGroupId("album".to_string());

        consolidator.submit(group_event("album", 640, 480, "small"));
        arm_group_timer(
            consolidator.clone(),
            relay.clone(),
            group.clone(),
            Duration::from_millis(20),
        );
        // straggler inside the window still takes part in the selection
        consolidator.submit(group_event("album", 1920, 1080, "large"));

        let job = tokio::time::timeout(Duration::from_secs(1), jobs.recv())
            .await
            .expect("timer fired within the window")
            .expect("queue open");
        match job {
            RelayJob::Consolidated(item) => assert_eq!(item.best.file_id.0, "large"),
            other => panic!("expected a consolidated item, got {other:?}"),
        }

        // after finalization nothing else reaches the queue
        consolidator.submit(group_event("album", 4000, 3000, "late"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(jobs.try_recv().is_err());
    }
}
