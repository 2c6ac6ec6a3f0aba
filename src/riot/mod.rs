//! Riot API surface: payload types, region routing, and the `GameApi` seam
//! the tracking engine is generic over.

pub mod client;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

pub use client::RiotClient;

/// Characters escaped in URL path segments (space, quotes, brackets, `#`).
pub(crate) const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Fault classification for a single API call. 404 is not represented here:
/// the request primitive turns it into an empty `Ok` result.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request timed out: {url}")]
    Timeout { url: String },
    #[error("API key rejected (403 Forbidden)")]
    Forbidden,
    #[error("unexpected HTTP status {status}: {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("malformed response payload: {0}")]
    Decode(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure to turn a display name into a puuid. The first two variants are
/// user input problems and are surfaced verbatim to the command issuer.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Riot ID must be in `GameName#TagLine` form")]
    MalformedRiotId,
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    #[error("no player found for that Riot ID")]
    NotFound,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Platform + continental API routing domains for a region code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Routing {
    pub platform: &'static str,
    pub continental: &'static str,
}

/// Region codes accepted by the register command, in the order they are
/// offered as command choices.
pub const REGIONS: &[&str] = &[
    "BR1", "EUN1", "EUW1", "JP1", "KR", "LA1", "LA2", "NA1", "OC1", "TR1", "RU", "PH2", "SG2",
    "TH2", "TW2", "VN2",
];

pub fn routing(region: &str) -> Option<Routing> {
    let (platform, continental) = match region {
        "BR1" => ("br1", "americas"),
        "EUN1" => ("eun1", "europe"),
        "EUW1" => ("euw1", "europe"),
        "JP1" => ("jp1", "asia"),
        "KR" => ("kr", "asia"),
        "LA1" => ("la1", "americas"),
        "LA2" => ("la2", "americas"),
        "NA1" => ("na1", "americas"),
        "OC1" => ("oc1", "sea"),
        "TR1" => ("tr1", "europe"),
        "RU" => ("ru", "europe"),
        "PH2" => ("ph2", "sea"),
        "SG2" => ("sg2", "sea"),
        "TH2" => ("th2", "sea"),
        "TW2" => ("tw2", "sea"),
        "VN2" => ("vn2", "sea"),
        _ => return None,
    };
    Some(Routing {
        platform,
        continental,
    })
}

// --- spectator-v5 (active game) ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGame {
    pub game_id: i64,
    #[serde(default)]
    pub game_mode: String,
    pub game_queue_config_id: Option<i64>,
    #[serde(default)]
    pub participants: Vec<CurrentGameParticipant>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGameParticipant {
    pub puuid: String,
    pub champion_id: i64,
    #[serde(default)]
    pub profile_icon_id: i64,
}

impl CurrentGame {
    pub fn participant(&self, puuid: &str) -> Option<&CurrentGameParticipant> {
        self.participants.iter().find(|p| p.puuid == puuid)
    }
}

// --- match-v5 (finished match) ---

#[derive(Debug, Clone, Deserialize)]
pub struct MatchDto {
    pub info: MatchInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub queue_id: Option<i64>,
    #[serde(default)]
    pub game_mode: String,
    #[serde(default)]
    pub participants: Vec<MatchParticipant>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchParticipant {
    pub puuid: String,
    pub champion_id: i64,
    #[serde(default)]
    pub profile_icon: i64,
    #[serde(default)]
    pub win: bool,
    #[serde(default)]
    pub kills: i64,
    #[serde(default)]
    pub deaths: i64,
    #[serde(default)]
    pub assists: i64,
}

impl MatchInfo {
    pub fn participant(&self, puuid: &str) -> Option<&MatchParticipant> {
        self.participants.iter().find(|p| p.puuid == puuid)
    }
}

// --- account-v1 ---

#[derive(Debug, Clone, Deserialize)]
pub struct AccountDto {
    pub puuid: String,
}

// --- Data Dragon reference data ---

/// Static reference data fetched once at startup: the current asset version
/// and the champion-id → name table. Loading is best effort; an empty
/// catalog degrades lookups to placeholders.
#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    pub version: String,
    pub champions: HashMap<i64, String>,
}

impl AssetCatalog {
    pub fn champion_name(&self, champion_id: i64) -> String {
        self.champions
            .get(&champion_id)
            .cloned()
            .unwrap_or_else(|| "Unknown champion".to_string())
    }

    /// Profile icon URL for the current asset version, or None when the
    /// catalog never loaded.
    pub fn profile_icon_url(&self, icon_id: i64) -> Option<String> {
        if self.version.is_empty() {
            return None;
        }
        Some(format!(
            "https://ddragon.leagueoflegends.com/cdn/{}/img/profileicon/{}.png",
            self.version, icon_id
        ))
    }
}

/// The remote game-data operations the tracking engine depends on.
/// Implemented by `RiotClient`; tests substitute scripted stubs.
#[async_trait]
pub trait GameApi: Send + Sync {
    /// Resolve a `Name#Tag` display name to a puuid.
    async fn resolve_account(&self, riot_id: &str, region: &str) -> Result<String, ResolveError>;

    /// Active match for a player, or None when not in game.
    async fn active_game(&self, puuid: &str, region: &str)
        -> Result<Option<CurrentGame>, ApiError>;

    /// Result of a finished match, or None when not yet available.
    async fn match_result(&self, match_id: &str, region: &str)
        -> Result<Option<MatchInfo>, ApiError>;
}

/// Split a `Name#Tag` display name, requiring exactly one separator and
/// non-empty halves.
pub fn split_riot_id(riot_id: &str) -> Result<(&str, &str), ResolveError> {
    let mut parts = riot_id.splitn(2, '#');
    let name = parts.next().unwrap_or_default();
    let tag = parts.next().ok_or(ResolveError::MalformedRiotId)?;
    if name.is_empty() || tag.is_empty() || tag.contains('#') {
        return Err(ResolveError::MalformedRiotId);
    }
    Ok((name, tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_covers_all_advertised_regions() {
        for region in REGIONS {
            assert!(routing(region).is_some(), "no routing for {region}");
        }
        assert!(routing("XX9").is_none());
        // Lookup is exact: codes are stored uppercase.
        assert!(routing("kr").is_none());
    }

    #[test]
    fn riot_id_split_rules() {
        assert_eq!(split_riot_id("Faker#KR1").unwrap(), ("Faker", "KR1"));
        assert!(split_riot_id("Faker").is_err());
        assert!(split_riot_id("#KR1").is_err());
        assert!(split_riot_id("Faker#").is_err());
        assert!(split_riot_id("Fa#ker#KR1").is_err());
    }

    #[test]
    fn catalog_falls_back_to_placeholder() {
        let catalog = AssetCatalog::default();
        assert_eq!(catalog.champion_name(266), "Unknown champion");
        assert!(catalog.profile_icon_url(588).is_none());

        let catalog = AssetCatalog {
            version: "15.1.1".to_string(),
            champions: HashMap::from([(266, "Aatrox".to_string())]),
        };
        assert_eq!(catalog.champion_name(266), "Aatrox");
        assert_eq!(
            catalog.profile_icon_url(588).unwrap(),
            "https://ddragon.leagueoflegends.com/cdn/15.1.1/img/profileicon/588.png"
        );
    }

    #[test]
    fn spectator_payload_decodes() {
        let game: CurrentGame = serde_json::from_str(
            r#"{
                "gameId": 555,
                "gameMode": "CLASSIC",
                "gameQueueConfigId": 420,
                "participants": [
                    {"puuid": "puuid-1", "championId": 266, "profileIconId": 588}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(game.game_id, 555);
        assert_eq!(game.game_queue_config_id, Some(420));
        assert_eq!(game.participant("puuid-1").unwrap().champion_id, 266);
        assert!(game.participant("puuid-2").is_none());
    }
}
