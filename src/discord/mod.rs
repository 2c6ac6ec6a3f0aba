//! Discord front-end: slash commands, notification embeds, and the
//! `ChatGateway` implementation the tracking engine posts through.
//!
//! Register requests are acknowledged immediately and queued for the engine;
//! the eventual outcome edits the deferred response. Remove and status are
//! answered inline from the store.

use crate::commands::{Command, CommandSender};
use crate::monitor::{ChatError, ChatGateway};
use crate::notify::Notification;
use crate::riot::REGIONS;
use crate::store::TrackerStore;
use async_trait::async_trait;
use serenity::all::{
    ChannelId, Colour, CommandDataOptionValue, CommandInteraction, CommandOptionType, Context,
    CreateAutocompleteResponse, CreateCommand, CreateCommandOption, CreateEmbed,
    CreateEmbedFooter, CreateInteractionResponse, CreateInteractionResponseMessage,
    CreateMessage, EditInteractionResponse, EditMessage, EventHandler, Interaction, MessageId,
    Ready, Timestamp,
};
use serenity::http::{Http, HttpError};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

const AUTOCOMPLETE_LIMIT: usize = 25;

/// Posts and edits notification messages over the Discord REST API.
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatGateway for DiscordGateway {
    async fn send_notification(
        &self,
        channel_id: u64,
        note: &Notification,
    ) -> Result<u64, ChatError> {
        let message = ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().embed(notification_embed(note)))
            .await
            .map_err(map_chat_error)?;
        Ok(message.id.get())
    }

    async fn edit_notification(
        &self,
        channel_id: u64,
        message_id: u64,
        note: &Notification,
    ) -> Result<(), ChatError> {
        ChannelId::new(channel_id)
            .edit_message(
                &self.http,
                MessageId::new(message_id),
                EditMessage::new().embed(notification_embed(note)),
            )
            .await
            .map_err(map_chat_error)?;
        Ok(())
    }
}

fn map_chat_error(e: serenity::Error) -> ChatError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(ref resp)) = e {
        match resp.status_code.as_u16() {
            404 => return ChatError::NotFound,
            403 => return ChatError::Forbidden,
            _ => {}
        }
    }
    ChatError::Transport(e.to_string())
}

fn notification_embed(note: &Notification) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(note.title.clone())
        .url(note.url.clone())
        .field("Game mode", note.mode.clone(), true)
        .field("Champion", note.champion.clone(), true)
        .timestamp(Timestamp::now());
    if let Some(thumbnail) = &note.thumbnail_url {
        embed = embed.thumbnail(thumbnail.clone());
    }
    match &note.outcome {
        None => embed
            .description("`Click the title to spectate`")
            .colour(Colour::BLUE)
            .footer(CreateEmbedFooter::new("Match start")),
        Some(outcome) => {
            let colour = if outcome.win {
                Colour::DARK_GREEN
            } else {
                Colour::RED
            };
            embed
                .description("`Click the title for the full result`")
                .colour(colour)
                .field("Result", outcome.label(), true)
                .field("KDA", outcome.kda.clone(), true)
                .footer(CreateEmbedFooter::new("Match result"))
        }
    }
}

/// Gateway event handler: registers the slash commands and routes
/// interactions.
pub struct Handler {
    store: Arc<Mutex<TrackerStore>>,
    commands: CommandSender,
}

impl Handler {
    pub fn new(store: Arc<Mutex<TrackerStore>>, commands: CommandSender) -> Self {
        Self { store, commands }
    }

    async fn handle_set(&self, ctx: &Context, cmd: CommandInteraction) {
        let Some(riot_id) = str_option(&cmd, "riot_id") else {
            return;
        };
        let Some(region) = str_option(&cmd, "region") else {
            return;
        };
        info!(player = %riot_id, region = %region, "/summonerset received");

        // Resolution can take a while; acknowledge now, queue the work, and
        // let the outcome edit this response.
        let ack = CreateInteractionResponseMessage::new()
            .content("⏳ Registration started in the background...")
            .ephemeral(true);
        if let Err(e) = cmd
            .create_response(&ctx.http, CreateInteractionResponse::Message(ack))
            .await
        {
            error!(error = %e, "failed to acknowledge /summonerset");
            return;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = self.commands.send(Command::Register {
            riot_id,
            region,
            channel_id: cmd.channel_id.get(),
            reply: reply_tx,
        });
        if queued.is_err() {
            error!("command queue closed, dropping /summonerset");
            return;
        }

        let http = ctx.http.clone();
        tokio::spawn(async move {
            let Ok(text) = reply_rx.await else {
                return;
            };
            let edit = EditInteractionResponse::new().content(text);
            if let Err(e) = cmd.edit_response(&http, edit).await {
                warn!(error = %e, "failed to deliver register outcome");
            }
        });
    }

    async fn handle_remove(&self, ctx: &Context, cmd: CommandInteraction) {
        let Some(riot_id) = str_option(&cmd, "riot_id") else {
            return;
        };
        let channel_id = cmd.channel_id.get();
        info!(player = %riot_id, channel_id, "/summonerremove received");

        let removed = self.store.lock().await.remove_player(&riot_id, channel_id);
        let content = match removed {
            Ok(true) => format!("✅ Removed `{riot_id}` from this channel's watch list."),
            Ok(false) => format!("❌ `{riot_id}` is not on this channel's watch list."),
            Err(e) => {
                error!(player = %riot_id, error = %e, "failed to persist removal");
                "❌ Error: the watch list could not be saved.".to_string()
            }
        };
        respond_ephemeral(ctx, &cmd, CreateInteractionResponseMessage::new().content(content))
            .await;
    }

    async fn handle_status(&self, ctx: &Context, cmd: CommandInteraction) {
        let channel_id = cmd.channel_id.get();
        let (stats, channel_players) = {
            let store = self.store.lock().await;
            (store.stats(), store.players_in_channel(channel_id))
        };

        let roster = if channel_players.is_empty() {
            "Nobody is tracked here yet".to_string()
        } else {
            channel_players
                .iter()
                .map(|p| format!("• {} ({})", p.riot_id, p.region))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let embed = CreateEmbed::new()
            .title("🤖 Tracker Status")
            .colour(Colour::BLUE)
            .field(
                "Global",
                format!(
                    "Tracked players: {}\nMatches in flight: {}",
                    stats.players, stats.in_flight
                ),
                false,
            )
            .field(
                format!("This channel ({})", channel_players.len()),
                roster,
                false,
            );
        respond_ephemeral(ctx, &cmd, CreateInteractionResponseMessage::new().embed(embed)).await;
    }

    /// Channel-scoped name suggestions for /summonerremove.
    async fn handle_autocomplete(&self, ctx: &Context, cmd: CommandInteraction) {
        let Some(current) = cmd.data.autocomplete().map(|o| o.value.to_lowercase()) else {
            return;
        };
        let players = self
            .store
            .lock()
            .await
            .players_in_channel(cmd.channel_id.get());

        let mut response = CreateAutocompleteResponse::new();
        for player in players
            .iter()
            .filter(|p| p.riot_id.to_lowercase().contains(&current))
            .take(AUTOCOMPLETE_LIMIT)
        {
            response = response.add_string_choice(player.riot_id.clone(), player.riot_id.clone());
        }
        if let Err(e) = cmd
            .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
            .await
        {
            warn!(error = %e, "autocomplete response failed");
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "connected to Discord");

        let commands = vec![
            CreateCommand::new("summonerset")
                .description("Register or update a tracked summoner in this channel")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "riot_id",
                        "Riot ID to track, e.g. Faker#KR1",
                    )
                    .required(true),
                )
                .add_option({
                    let mut option = CreateCommandOption::new(
                        CommandOptionType::String,
                        "region",
                        "Region code",
                    )
                    .required(true);
                    for region in REGIONS {
                        option = option.add_string_choice(*region, *region);
                    }
                    option
                }),
            CreateCommand::new("summonerremove")
                .description("Remove a summoner from this channel's watch list")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "riot_id",
                        "Riot ID to remove",
                    )
                    .required(true)
                    .set_autocomplete(true),
                ),
            CreateCommand::new("status")
                .description("Show tracker status and this channel's watch list"),
        ];
        if let Err(e) =
            serenity::all::Command::set_global_commands(&ctx.http, commands).await
        {
            error!(error = %e, "slash command registration failed");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(cmd) => match cmd.data.name.as_str() {
                "summonerset" => self.handle_set(&ctx, cmd).await,
                "summonerremove" => self.handle_remove(&ctx, cmd).await,
                "status" => self.handle_status(&ctx, cmd).await,
                other => warn!(command = %other, "unknown slash command"),
            },
            Interaction::Autocomplete(cmd) => self.handle_autocomplete(&ctx, cmd).await,
            _ => {}
        }
    }
}

fn str_option(cmd: &CommandInteraction, name: &str) -> Option<String> {
    cmd.data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::String(s) => Some(s.clone()),
        _ => None,
    })
}

async fn respond_ephemeral(
    ctx: &Context,
    cmd: &CommandInteraction,
    message: CreateInteractionResponseMessage,
) {
    let response = CreateInteractionResponse::Message(message.ephemeral(true));
    if let Err(e) = cmd.create_response(&ctx.http, response).await {
        error!(command = %cmd.data.name, error = %e, "interaction response failed");
    }
}
