//! The tracking engine.
//!
//! Three entry points, each driven by its own timer task in `main`:
//! - `run_new_game_cycle` walks the tracked players and announces matches
//!   that have not been announced yet,
//! - `run_finished_cycle` walks the in-flight matches and folds available
//!   results back into the original messages,
//! - `handle_command` processes one queued command from the chat front-end.
//!
//! Remote and chat faults abandon the current iteration and are retried by
//! the next scheduled cycle. Store faults bubble up to the cycle boundary,
//! where they are logged; they never take the process down.

use crate::commands::Command;
use crate::notify::{self, Notification};
use crate::riot::{AssetCatalog, GameApi};
use crate::store::{InFlightMatch, StoreError, TrackedPlayer, TrackerStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Chat-platform fault classes the engine reacts to. `NotFound` covers both
/// a deleted channel and a deleted message; either way the associated
/// tracking record can never be fulfilled.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("channel or message no longer exists")]
    NotFound,
    #[error("missing permission to post")]
    Forbidden,
    #[error("chat transport error: {0}")]
    Transport(String),
}

/// The chat operations the engine needs. Implemented by the Discord
/// front-end; tests substitute recording stubs.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Post a notification, returning the created message id.
    async fn send_notification(
        &self,
        channel_id: u64,
        note: &Notification,
    ) -> Result<u64, ChatError>;

    /// Replace a previously posted notification in place.
    async fn edit_notification(
        &self,
        channel_id: u64,
        message_id: u64,
        note: &Notification,
    ) -> Result<(), ChatError>;
}

/// Finished-poll cycles where the result existed but the player's entry was
/// missing, before the in-flight record is dropped.
const RESULT_MISS_LIMIT: u32 = 5;

pub struct GameMonitor<A, C> {
    store: Arc<Mutex<TrackerStore>>,
    api: Arc<A>,
    chat: Arc<C>,
    assets: Arc<AssetCatalog>,
    new_game_pause: Duration,
    finished_pause: Duration,
}

impl<A: GameApi, C: ChatGateway> GameMonitor<A, C> {
    pub fn new(
        store: Arc<Mutex<TrackerStore>>,
        api: Arc<A>,
        chat: Arc<C>,
        assets: Arc<AssetCatalog>,
        new_game_pause: Duration,
        finished_pause: Duration,
    ) -> Self {
        Self {
            store,
            api,
            chat,
            assets,
            new_game_pause,
            finished_pause,
        }
    }

    /// One scheduled pass over all tracked players, paced between API calls.
    pub async fn run_new_game_cycle(&self) {
        let players = self.store.lock().await.players().to_vec();
        if players.is_empty() {
            return;
        }
        info!(players = players.len(), "new-match poll cycle");
        for player in &players {
            if let Err(e) = self.poll_player(player).await {
                error!(player = %player.riot_id, error = %e, "poll aborted on store fault");
            }
            tokio::time::sleep(self.new_game_pause).await;
        }
    }

    /// One scheduled pass over all in-flight matches, paced between API calls.
    pub async fn run_finished_cycle(&self) {
        let games = self.store.lock().await.in_flight();
        if games.is_empty() {
            return;
        }
        info!(in_flight = games.len(), "finished-match poll cycle");
        for game in &games {
            if let Err(e) = self.poll_finished(game).await {
                error!(match_id = %game.match_id, error = %e, "poll aborted on store fault");
            }
            tokio::time::sleep(self.finished_pause).await;
        }
    }

    /// Check one player for a newly started match and announce it.
    pub async fn poll_player(&self, player: &TrackedPlayer) -> Result<(), StoreError> {
        debug!(player = %player.riot_id, "checking for an active match");
        let game = match self.api.active_game(&player.puuid, &player.region).await {
            Ok(Some(game)) => game,
            Ok(None) => {
                debug!(player = %player.riot_id, "not in a match");
                return Ok(());
            }
            // Already logged at the client; the next cycle retries.
            Err(_) => return Ok(()),
        };

        let game_id = game.game_id.to_string();
        if self.store.lock().await.is_notified(&player.puuid, &game_id) {
            debug!(player = %player.riot_id, game_id = %game_id, "match already announced");
            return Ok(());
        }

        let Some(participant) = game.participant(&player.puuid) else {
            // Do not mark notified: a later payload may carry the entry.
            error!(player = %player.riot_id, game_id = %game_id, "player missing from match payload");
            return Ok(());
        };

        let note = notify::game_start(
            &player.riot_id,
            &player.region,
            &game,
            participant,
            &self.assets,
        );
        let message_id = match self.chat.send_notification(player.channel_id, &note).await {
            Ok(id) => id,
            Err(ChatError::NotFound) => {
                error!(channel_id = player.channel_id, "notification channel not found");
                return Ok(());
            }
            Err(ChatError::Forbidden) => {
                error!(channel_id = player.channel_id, "not allowed to post in channel");
                return Ok(());
            }
            Err(ChatError::Transport(e)) => {
                error!(channel_id = player.channel_id, error = %e, "start notification failed");
                return Ok(());
            }
        };
        info!(
            player = %player.riot_id,
            game_id = %game_id,
            message_id,
            "match start announced"
        );

        let mut store = self.store.lock().await;
        store.set_notified(&player.puuid, &game_id)?;
        store.add_in_flight(InFlightMatch {
            puuid: player.puuid.clone(),
            match_id: format!("{}_{}", player.region.to_uppercase(), game_id),
            region: player.region.clone(),
            channel_id: player.channel_id,
            message_id,
            riot_id: player.riot_id.clone(),
            result_misses: 0,
        })?;
        Ok(())
    }

    /// Check one in-flight match for a result and fold it into the original
    /// message. The record survives until the result has been rendered or is
    /// known to be unrenderable.
    pub async fn poll_finished(&self, game: &InFlightMatch) -> Result<(), StoreError> {
        let result = match self.api.match_result(&game.match_id, &game.region).await {
            Ok(Some(result)) => result,
            Ok(None) => return Ok(()), // still running
            Err(_) => return Ok(()),
        };
        info!(match_id = %game.match_id, "match finished");

        let Some(participant) = result.participant(&game.puuid) else {
            let mut store = self.store.lock().await;
            let misses = store.bump_result_miss(&game.match_id)?;
            if misses >= RESULT_MISS_LIMIT {
                error!(
                    match_id = %game.match_id,
                    misses,
                    "player never appeared in the result, dropping record"
                );
                store.remove_in_flight(&game.match_id)?;
            } else {
                error!(match_id = %game.match_id, misses, "player missing from match result");
            }
            return Ok(());
        };

        let note = notify::match_result(
            game,
            result.queue_id,
            &result.game_mode,
            participant,
            &self.assets,
        );
        match self
            .chat
            .edit_notification(game.channel_id, game.message_id, &note)
            .await
        {
            Ok(()) => {
                info!(
                    match_id = %game.match_id,
                    message_id = game.message_id,
                    "message updated with match result"
                );
                self.store.lock().await.remove_in_flight(&game.match_id)?;
            }
            Err(ChatError::NotFound) => {
                warn!(
                    match_id = %game.match_id,
                    "channel or message gone, dropping record"
                );
                self.store.lock().await.remove_in_flight(&game.match_id)?;
            }
            Err(ChatError::Forbidden) => {
                warn!(match_id = %game.match_id, "not allowed to edit message, will retry");
            }
            Err(ChatError::Transport(e)) => {
                warn!(match_id = %game.match_id, error = %e, "result edit failed, will retry");
            }
        }
        Ok(())
    }

    /// Process one queued command from the chat front-end.
    pub async fn handle_command(&self, command: Command) {
        match command {
            Command::Register {
                riot_id,
                region,
                channel_id,
                reply,
            } => {
                info!(player = %riot_id, region = %region, "processing register command");
                let puuid = match self.api.resolve_account(&riot_id, &region).await {
                    Ok(puuid) => puuid,
                    Err(e) => {
                        warn!(player = %riot_id, error = %e, "registration failed");
                        let _ = reply.send(format!("❌ Error: {e}"));
                        return;
                    }
                };

                let player = TrackedPlayer {
                    riot_id: riot_id.clone(),
                    puuid,
                    region,
                    channel_id,
                };
                let updated = match self.store.lock().await.upsert_player(player.clone()) {
                    Ok(updated) => updated,
                    Err(e) => {
                        error!(player = %riot_id, error = %e, "failed to persist registration");
                        let _ = reply.send("❌ Error: registration could not be saved.".to_string());
                        return;
                    }
                };
                let text = if updated {
                    format!("✅ Updated the settings for `{riot_id}`.")
                } else {
                    format!("✅ Now tracking `{riot_id}`.")
                };
                let _ = reply.send(text);

                // Catch a match already in progress instead of waiting for
                // the next scheduled cycle.
                info!(player = %player.riot_id, "running immediate post-register check");
                if let Err(e) = self.poll_player(&player).await {
                    error!(player = %player.riot_id, error = %e, "immediate poll aborted on store fault");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riot::{
        routing, ApiError, CurrentGame, CurrentGameParticipant, MatchInfo, MatchParticipant,
        ResolveError,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::oneshot;

    /// Scripted game-data API: whatever the maps hold is what the remote
    /// returns.
    #[derive(Default)]
    struct StubApi {
        accounts: HashMap<String, String>,
        active: StdMutex<HashMap<String, CurrentGame>>,
        results: StdMutex<HashMap<String, MatchInfo>>,
    }

    #[async_trait]
    impl GameApi for StubApi {
        async fn resolve_account(
            &self,
            riot_id: &str,
            region: &str,
        ) -> Result<String, ResolveError> {
            crate::riot::split_riot_id(riot_id)?;
            if routing(region).is_none() {
                return Err(ResolveError::UnknownRegion(region.to_string()));
            }
            self.accounts
                .get(riot_id)
                .cloned()
                .ok_or(ResolveError::NotFound)
        }

        async fn active_game(
            &self,
            puuid: &str,
            _region: &str,
        ) -> Result<Option<CurrentGame>, ApiError> {
            Ok(self.active.lock().unwrap().get(puuid).cloned())
        }

        async fn match_result(
            &self,
            match_id: &str,
            _region: &str,
        ) -> Result<Option<MatchInfo>, ApiError> {
            Ok(self.results.lock().unwrap().get(match_id).cloned())
        }
    }

    /// Recording chat gateway with scriptable failures.
    #[derive(Default)]
    struct StubChat {
        sent: StdMutex<Vec<(u64, Notification)>>,
        edited: StdMutex<Vec<(u64, u64, Notification)>>,
        next_message_id: AtomicU64,
        edit_fails_not_found: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl ChatGateway for StubChat {
        async fn send_notification(
            &self,
            channel_id: u64,
            note: &Notification,
        ) -> Result<u64, ChatError> {
            let id = 100 + self.next_message_id.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push((channel_id, note.clone()));
            Ok(id)
        }

        async fn edit_notification(
            &self,
            channel_id: u64,
            message_id: u64,
            note: &Notification,
        ) -> Result<(), ChatError> {
            if self.edit_fails_not_found.load(Ordering::SeqCst) {
                return Err(ChatError::NotFound);
            }
            self.edited
                .lock()
                .unwrap()
                .push((channel_id, message_id, note.clone()));
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<Mutex<TrackerStore>>,
        api: Arc<StubApi>,
        chat: Arc<StubChat>,
        monitor: GameMonitor<StubApi, StubChat>,
    }

    fn harness(api: StubApi) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Mutex::new(TrackerStore::open(dir.path().join("db.json"))));
        let api = Arc::new(api);
        let chat = Arc::new(StubChat::default());
        let monitor = GameMonitor::new(
            store.clone(),
            api.clone(),
            chat.clone(),
            Arc::new(AssetCatalog::default()),
            Duration::from_secs(2),
            Duration::from_secs(5),
        );
        Harness {
            _dir: dir,
            store,
            api,
            chat,
            monitor,
        }
    }

    fn active_game_555(puuid: &str) -> CurrentGame {
        CurrentGame {
            game_id: 555,
            game_mode: "CLASSIC".to_string(),
            game_queue_config_id: Some(420),
            participants: vec![CurrentGameParticipant {
                puuid: puuid.to_string(),
                champion_id: 266,
                profile_icon_id: 588,
            }],
        }
    }

    fn finished_result(puuid: &str, win: bool) -> MatchInfo {
        MatchInfo {
            queue_id: Some(420),
            game_mode: "CLASSIC".to_string(),
            participants: vec![MatchParticipant {
                puuid: puuid.to_string(),
                champion_id: 266,
                profile_icon: 588,
                win,
                kills: 10,
                deaths: 2,
                assists: 7,
            }],
        }
    }

    async fn register(h: &Harness, riot_id: &str, region: &str, channel_id: u64) -> String {
        let (tx, rx) = oneshot::channel();
        h.monitor
            .handle_command(Command::Register {
                riot_id: riot_id.to_string(),
                region: region.to_string(),
                channel_id,
                reply: tx,
            })
            .await;
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn register_resolves_and_announces_live_match() {
        let mut api = StubApi::default();
        api.accounts
            .insert("Faker#KR1".to_string(), "puuid-1".to_string());
        api.active
            .get_mut()
            .unwrap()
            .insert("puuid-1".to_string(), active_game_555("puuid-1"));
        let h = harness(api);

        let reply = register(&h, "Faker#KR1", "KR", 42).await;
        assert!(reply.contains("Now tracking"), "reply was: {reply}");

        // The immediate post-register poll announced the live match.
        assert_eq!(h.chat.sent.lock().unwrap().len(), 1);
        assert_eq!(h.chat.sent.lock().unwrap()[0].0, 42);

        let store = h.store.lock().await;
        assert!(store.is_notified("puuid-1", "555"));
        let in_flight = store.in_flight();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].match_id, "KR_555");
        assert_eq!(in_flight[0].message_id, 100);
    }

    #[tokio::test]
    async fn second_poll_of_same_game_is_suppressed() {
        let mut api = StubApi::default();
        api.accounts
            .insert("Faker#KR1".to_string(), "puuid-1".to_string());
        api.active
            .get_mut()
            .unwrap()
            .insert("puuid-1".to_string(), active_game_555("puuid-1"));
        let h = harness(api);

        register(&h, "Faker#KR1", "KR", 42).await;
        let player = h.store.lock().await.players()[0].clone();
        h.monitor.poll_player(&player).await.unwrap();

        assert_eq!(h.chat.sent.lock().unwrap().len(), 1);
        assert_eq!(h.store.lock().await.in_flight().len(), 1);
    }

    #[tokio::test]
    async fn register_with_unknown_region_mutates_nothing() {
        let mut api = StubApi::default();
        api.accounts
            .insert("Faker#KR1".to_string(), "puuid-1".to_string());
        let h = harness(api);

        let reply = register(&h, "Faker#KR1", "MOON", 42).await;
        assert!(reply.contains("unknown region"), "reply was: {reply}");
        assert!(h.store.lock().await.players().is_empty());
        assert!(h.chat.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_with_malformed_name_reports_validation_error() {
        let h = harness(StubApi::default());
        let reply = register(&h, "Faker", "KR", 42).await;
        assert!(reply.contains("GameName#TagLine"), "reply was: {reply}");
        assert!(h.store.lock().await.players().is_empty());
    }

    #[tokio::test]
    async fn missing_participant_in_active_payload_does_not_mark_notified() {
        let mut api = StubApi::default();
        api.accounts
            .insert("Faker#KR1".to_string(), "puuid-1".to_string());
        // Payload exists but carries someone else's entry.
        api.active
            .get_mut()
            .unwrap()
            .insert("puuid-1".to_string(), active_game_555("puuid-other"));
        let h = harness(api);

        register(&h, "Faker#KR1", "KR", 42).await;

        assert!(h.chat.sent.lock().unwrap().is_empty());
        let store = h.store.lock().await;
        assert!(!store.is_notified("puuid-1", "555"));
        assert!(store.in_flight().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_match_edits_message_and_resolves_record() {
        let mut api = StubApi::default();
        api.accounts
            .insert("Faker#KR1".to_string(), "puuid-1".to_string());
        api.active
            .get_mut()
            .unwrap()
            .insert("puuid-1".to_string(), active_game_555("puuid-1"));
        let h = harness(api);
        register(&h, "Faker#KR1", "KR", 42).await;

        h.api
            .results
            .lock()
            .unwrap()
            .insert("KR_555".to_string(), finished_result("puuid-1", true));
        h.monitor.run_finished_cycle().await;

        let edited = h.chat.edited.lock().unwrap();
        assert_eq!(edited.len(), 1);
        let (channel_id, message_id, note) = &edited[0];
        assert_eq!((*channel_id, *message_id), (42, 100));
        assert_eq!(note.outcome.as_ref().unwrap().label(), "Victory");
        assert_eq!(note.outcome.as_ref().unwrap().kda, "10/2/7");
        drop(edited);

        // Terminal: the record is gone and later cycles do nothing.
        assert!(h.store.lock().await.in_flight().is_empty());
        h.monitor.run_finished_cycle().await;
        assert_eq!(h.chat.edited.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_message_drops_record_without_crash() {
        let mut api = StubApi::default();
        api.accounts
            .insert("Faker#KR1".to_string(), "puuid-1".to_string());
        api.active
            .get_mut()
            .unwrap()
            .insert("puuid-1".to_string(), active_game_555("puuid-1"));
        let h = harness(api);
        register(&h, "Faker#KR1", "KR", 42).await;

        h.api
            .results
            .lock()
            .unwrap()
            .insert("KR_555".to_string(), finished_result("puuid-1", false));
        h.chat.edit_fails_not_found.store(true, Ordering::SeqCst);
        h.monitor.run_finished_cycle().await;

        assert!(h.store.lock().await.in_flight().is_empty());
        assert!(h.chat.edited.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_result_leaves_record_in_place() {
        let mut api = StubApi::default();
        api.accounts
            .insert("Faker#KR1".to_string(), "puuid-1".to_string());
        api.active
            .get_mut()
            .unwrap()
            .insert("puuid-1".to_string(), active_game_555("puuid-1"));
        let h = harness(api);
        register(&h, "Faker#KR1", "KR", 42).await;

        // No result scripted: the match is still running.
        h.monitor.run_finished_cycle().await;
        assert_eq!(h.store.lock().await.in_flight().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanently_missing_participant_hits_retry_cap() {
        let mut api = StubApi::default();
        api.accounts
            .insert("Faker#KR1".to_string(), "puuid-1".to_string());
        api.active
            .get_mut()
            .unwrap()
            .insert("puuid-1".to_string(), active_game_555("puuid-1"));
        let h = harness(api);
        register(&h, "Faker#KR1", "KR", 42).await;

        // Result exists but the player's entry never shows up in it.
        h.api
            .results
            .lock()
            .unwrap()
            .insert("KR_555".to_string(), finished_result("puuid-other", true));

        for cycle in 1..RESULT_MISS_LIMIT {
            h.monitor.run_finished_cycle().await;
            assert_eq!(
                h.store.lock().await.in_flight().len(),
                1,
                "dropped too early, cycle {cycle}"
            );
        }
        h.monitor.run_finished_cycle().await;
        assert!(h.store.lock().await.in_flight().is_empty());
        assert!(h.chat.edited.lock().unwrap().is_empty());
    }
}
