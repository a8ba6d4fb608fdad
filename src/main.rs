use std::error::Error;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

mod config;
mod grouping;
mod handlers;
mod processor;
mod relay;
mod server;
mod state;
mod utils;

use config::CONFIG;
use handlers::{commands, photos};
use state::AppState;
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
    Help,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging();

    let bot = Bot::new(CONFIG.bot_token.clone());
    info!("Starting TelegramChannelRelayBot");

    let (relay, jobs) = relay::channel(CONFIG.relay_queue_capacity);
    tokio::spawn(relay::run(bot.clone(), jobs));

    let state = AppState::new(relay.clone());

    tokio::spawn(async move {
        if let Err(err) = server::serve(relay).await {
            error!("webhook ingest server exited: {err}");
        }
    });

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo))
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some() || msg.caption().is_some())
                .endpoint(handle_other),
        )
        .endpoint(ignore_message);

    Dispatcher::builder(bot, dptree::entry().branch(message_handler))
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(bot: Bot, message: Message, command: Command) -> HandlerResult {
    match command {
        Command::Start => commands::start_handler(bot, message).await?,
        Command::Help => commands::help_handler(bot, message).await?,
    }
    Ok(())
}

async fn handle_photo(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    photos::photo_handler(bot, state, message).await?;
    Ok(())
}

async fn handle_other(bot: Bot, message: Message) -> HandlerResult {
    if let Some(text) = message.text().or_else(|| message.caption()) {
        if text.trim_start().starts_with('/') {
            return Ok(());
        }
    }
    commands::prompt_for_photo(bot, message).await?;
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
