use serde_json::json;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, InputFile, Recipient};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::CONFIG;
use crate::grouping::ConsolidatedItem;
use crate::utils::http::get_http_client;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to resolve file reference: {0}")]
    Resolution(#[source] teloxide::RequestError),
    #[error("channel delivery failed: {0}")]
    Delivery(#[source] teloxide::RequestError),
    #[error("invalid file url: {0}")]
    InvalidFileUrl(#[from] url::ParseError),
}

/// Caption sent with every relayed photo. Downstream consumers parse the
/// prefix, so the template must not change.
pub fn compose_caption(sender_label: &str, caption: Option<&str>) -> String {
    format!(
        "Prompt from @{}:\n\n{}",
        sender_label,
        caption.unwrap_or("no caption")
    )
}

/// `TELEGRAM_CHANNEL_ID` may be a numeric chat id or an `@username`.
pub fn channel_recipient(raw: &str) -> Recipient {
    match raw.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(raw.to_string()),
    }
}

pub async fn resolve_file_url(bot: &Bot, file_id: &FileId) -> Result<String, ProcessError> {
    let file = bot
        .get_file(file_id.clone())
        .await
        .map_err(ProcessError::Resolution)?;
    Ok(format!(
        "https://api.telegram.org/file/bot{}/{}",
        CONFIG.bot_token, file.path
    ))
}

/// Relays one consolidated photo: resolve, post to the channel, then
/// best-effort notify the automation webhook. Returns the acknowledgment
/// text for the original sender.
///
/// The channel post is never retried; a retry after an ambiguous failure
/// could duplicate the post.
pub async fn process(bot: &Bot, item: &ConsolidatedItem) -> Result<String, ProcessError> {
    let file_url = resolve_file_url(bot, &item.best.file_id).await?;
    let caption = compose_caption(&item.sender_label, item.caption.as_deref());
    send_photo_url(bot, &file_url, &caption).await?;
    info!(
        "Relayed photo from {} ({}x{}) to the channel",
        item.sender_label, item.best.width, item.best.height
    );

    if !CONFIG.make_webhook_url.trim().is_empty() {
        if let Err(err) = post_automation(&file_url, &caption, item).await {
            warn!("automation webhook call failed: {err}");
        }
    }

    Ok("sent".to_string())
}

/// Posts a photo by URL to the destination channel.
pub async fn send_photo_url(bot: &Bot, file_url: &str, caption: &str) -> Result<(), ProcessError> {
    let url = Url::parse(file_url)?;
    bot.send_photo(channel_recipient(&CONFIG.channel_id), InputFile::url(url))
        .caption(caption.to_string())
        .await
        .map_err(ProcessError::Delivery)?;
    Ok(())
}

async fn post_automation(
    file_url: &str,
    caption: &str,
    item: &ConsolidatedItem,
) -> Result<(), reqwest::Error> {
    let mut payload = json!({
        "file_url": file_url,
        "caption": caption,
        "source_chat_name": item.source_chat_name,
        "source_chat_id": item.source_chat_id,
    });
    if CONFIG.automation_rich_payload {
        payload["username"] = json!(item.sender_label);
        payload["message_id"] = json!(item.message_id.0);
    }

    get_http_client()
        .post(&CONFIG.make_webhook_url)
        .json(&payload)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_template_is_reproduced_verbatim() {
        assert_eq!(
            compose_caption("alice", Some("sunset over the bay")),
            "Prompt from @alice:\n\nsunset over the bay"
        );
    }

    #[test]
    fn missing_caption_uses_the_placeholder() {
        assert_eq!(
            compose_caption("bob", None),
            "Prompt from @bob:\n\nno caption"
        );
    }

    #[test]
    fn numeric_channel_id_becomes_a_chat_id() {
        match channel_recipient("-1001234567890") {
            Recipient::Id(id) => assert_eq!(id, ChatId(-1001234567890)),
            other => panic!("expected Recipient::Id, got {other:?}"),
        }
    }

    #[test]
    fn channel_username_passes_through() {
        match channel_recipient("@my_channel") {
            Recipient::ChannelUsername(name) => assert_eq!(name, "@my_channel"),
            other => panic!("expected Recipient::ChannelUsername, got {other:?}"),
        }
    }
}
