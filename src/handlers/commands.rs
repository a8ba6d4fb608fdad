use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(
        message.chat.id,
        "Hello! Send me an image with a caption and I will relay it to the channel.",
    )
    .reply_parameters(ReplyParameters::new(message.id))
    .await?;
    Ok(())
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(
        message.chat.id,
        "Send a photo (or an album) with a caption and I will post the best \
         version to the channel.\n\n/start - introduction\n/help - this message",
    )
    .reply_parameters(ReplyParameters::new(message.id))
    .await?;
    Ok(())
}

pub async fn prompt_for_photo(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(message.chat.id, "Please send an image with a caption.")
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}
