//! File-backed state store for player tracking.
//!
//! Data model (one JSON document, wire-compatible with earlier deployments):
//!   summoners       → array of TrackedPlayer
//!   notified_games  → puuid → last announced game id
//!   tracked_games   → array of InFlightMatch
//!
//! Every mutation rewrites the whole document synchronously. Before the
//! overwrite the previous file is renamed to `<file>.backup.<timestamp>`;
//! backups are never pruned. A missing or corrupt file on load resets the
//! store to empty rather than aborting startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to persist store: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode store document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A player being watched for match activity.
///
/// Unique per (riot_id case-insensitive, channel_id); the same display name
/// may be tracked in several channels independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedPlayer {
    /// Display name in `Name#Tag` form.
    pub riot_id: String,
    /// Opaque stable player id issued by the Riot API.
    pub puuid: String,
    /// Region code, e.g. "KR" or "EUW1".
    pub region: String,
    /// Discord channel the notifications go to.
    pub channel_id: u64,
}

/// A match that was announced but whose result has not been rendered yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InFlightMatch {
    pub puuid: String,
    /// Match-v5 identifier, `REGION_gameId`.
    pub match_id: String,
    pub region: String,
    pub channel_id: u64,
    /// The start-notification message this record will edit in place.
    pub message_id: u64,
    pub riot_id: String,
    /// Finished-poll cycles where the result existed but lacked the player's
    /// participant entry. The record is dropped once this hits the cap.
    #[serde(default)]
    pub result_misses: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    summoners: Vec<TrackedPlayer>,
    #[serde(default)]
    notified_games: HashMap<String, String>,
    #[serde(default)]
    tracked_games: Vec<InFlightMatch>,
}

/// Global counts for the status command.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub players: usize,
    pub in_flight: usize,
    pub markers: usize,
}

pub struct TrackerStore {
    path: PathBuf,
    doc: Document,
}

impl TrackerStore {
    /// Open the store at `path`, loading any existing document.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Document>(&contents) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store file corrupt, starting empty");
                    Document::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "store file unreadable, starting empty");
                Document::default()
            }
        };
        info!(
            path = %path.display(),
            players = doc.summoners.len(),
            in_flight = doc.tracked_games.len(),
            "store loaded"
        );
        Self { path, doc }
    }

    /// Rotate the previous file to a timestamped backup, then write the
    /// current document. Write failures bubble up: silent data loss is worse
    /// than a failed mutation.
    fn save(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let backup = backup_path(&self.path, &stamp.to_string());
            std::fs::rename(&self.path, &backup)?;
        }
        let contents = serde_json::to_string_pretty(&self.doc)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    // --- tracked players ---

    pub fn players(&self) -> &[TrackedPlayer] {
        &self.doc.summoners
    }

    /// Case-insensitive exact match on display name.
    pub fn find_by_name(&self, riot_id: &str) -> Option<&TrackedPlayer> {
        self.doc
            .summoners
            .iter()
            .find(|p| p.riot_id.eq_ignore_ascii_case(riot_id))
    }

    pub fn players_in_channel(&self, channel_id: u64) -> Vec<TrackedPlayer> {
        self.doc
            .summoners
            .iter()
            .filter(|p| p.channel_id == channel_id)
            .cloned()
            .collect()
    }

    /// Insert or update a tracked player, matching by display name
    /// (case-insensitive). Returns true when an existing record was updated.
    pub fn upsert_player(&mut self, player: TrackedPlayer) -> Result<bool, StoreError> {
        let existing = self
            .doc
            .summoners
            .iter_mut()
            .find(|p| p.riot_id.eq_ignore_ascii_case(&player.riot_id));
        let updated = match existing {
            Some(slot) => {
                *slot = player;
                true
            }
            None => {
                self.doc.summoners.push(player);
                false
            }
        };
        self.save()?;
        Ok(updated)
    }

    /// Remove a tracked player by (display name, channel). Cascades the
    /// notified marker and any in-flight matches for that player's puuid.
    /// Returns false (and mutates nothing) when no such record exists.
    pub fn remove_player(&mut self, riot_id: &str, channel_id: u64) -> Result<bool, StoreError> {
        let index = self.doc.summoners.iter().position(|p| {
            p.riot_id.eq_ignore_ascii_case(riot_id) && p.channel_id == channel_id
        });
        let Some(index) = index else {
            return Ok(false);
        };
        let removed = self.doc.summoners.remove(index);
        self.doc.notified_games.remove(&removed.puuid);
        self.doc.tracked_games.retain(|g| g.puuid != removed.puuid);
        self.save()?;
        Ok(true)
    }

    // --- notified markers ---

    /// Whether `game_id` is the last game already announced for this player.
    pub fn is_notified(&self, puuid: &str, game_id: &str) -> bool {
        self.doc.notified_games.get(puuid).map(String::as_str) == Some(game_id)
    }

    pub fn set_notified(&mut self, puuid: &str, game_id: &str) -> Result<(), StoreError> {
        self.doc
            .notified_games
            .insert(puuid.to_string(), game_id.to_string());
        self.save()
    }

    // --- in-flight matches ---

    pub fn in_flight(&self) -> Vec<InFlightMatch> {
        self.doc.tracked_games.clone()
    }

    pub fn add_in_flight(&mut self, game: InFlightMatch) -> Result<(), StoreError> {
        self.doc.tracked_games.push(game);
        self.save()
    }

    pub fn remove_in_flight(&mut self, match_id: &str) -> Result<(), StoreError> {
        let before = self.doc.tracked_games.len();
        self.doc.tracked_games.retain(|g| g.match_id != match_id);
        if self.doc.tracked_games.len() == before {
            return Ok(());
        }
        self.save()
    }

    /// Increment the result-miss counter for an in-flight match, returning
    /// the new count (0 when the record no longer exists).
    pub fn bump_result_miss(&mut self, match_id: &str) -> Result<u32, StoreError> {
        let Some(game) = self
            .doc
            .tracked_games
            .iter_mut()
            .find(|g| g.match_id == match_id)
        else {
            return Ok(0);
        };
        game.result_misses += 1;
        let misses = game.result_misses;
        self.save()?;
        Ok(misses)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            players: self.doc.summoners.len(),
            in_flight: self.doc.tracked_games.len(),
            markers: self.doc.notified_games.len(),
        }
    }
}

fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".backup.{stamp}"));
    PathBuf::from(name)
}
