use crate::bot;
use crate::bot::handlers::{caption_has_trigger, text_has_trigger, Command};
use crate::bot::TelegramTransport;
use crate::config::BotSettings;
use gemini_bot_core::adapter::MessageAdapter;
use gemini_bot_core::llm::providers::GeminiProvider;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let adapter = init_adapter(&settings);

    let bot = Bot::new(settings.telegram.telegram_token.clone());
    register_commands(&bot).await;

    let transport = TelegramTransport::new(bot.clone());
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![adapter, transport])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn init_adapter(settings: &BotSettings) -> Arc<MessageAdapter> {
    let gemini = settings.gemini.as_ref();
    let provider = GeminiProvider::with_api_base(
        gemini.api_key().to_string(),
        gemini.gemini_api_base.clone(),
    );
    info!(
        chat_model = %gemini.gemini_chat_model,
        vision_model = %gemini.gemini_vision_model,
        "Gemini client initialized."
    );
    Arc::new(MessageAdapter::new(Arc::new(provider), gemini))
}

async fn register_commands(bot: &Bot) {
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| text_has_trigger(msg.text())).endpoint(handle_text),
        )
        .branch(
            dptree::filter(|msg: Message| {
                msg.photo().is_some() && caption_has_trigger(msg.caption())
            })
            .endpoint(handle_photo),
        )
}

async fn handle_command(
    transport: TelegramTransport,
    msg: Message,
    cmd: Command,
    adapter: Arc<MessageAdapter>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Gemini(_) => bot::handlers::handle_text(transport, msg, adapter).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    transport: TelegramTransport,
    msg: Message,
    adapter: Arc<MessageAdapter>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_text(transport, msg, adapter).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_photo(
    transport: TelegramTransport,
    msg: Message,
    adapter: Arc<MessageAdapter>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_photo(transport, msg, adapter).await {
        error!("Photo handler error: {}", e);
    }
    respond(())
}
