//! Notification formatting.
//!
//! Pure mapping from match data to a displayable payload; no I/O, no state.
//! The chat front-end decides how a `Notification` is rendered (embed,
//! plain text, ...).

use crate::riot::{
    AssetCatalog, CurrentGame, CurrentGameParticipant, MatchParticipant, PATH_SEGMENT,
};
use crate::store::InFlightMatch;
use percent_encoding::utf8_percent_encode;

/// A displayable notification, either a match-start announcement or the
/// result card that replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    /// Deep link to a spectate/result page.
    pub url: String,
    /// Profile icon, absent when the asset catalog never loaded.
    pub thumbnail_url: Option<String>,
    /// Localized game mode label.
    pub mode: String,
    /// Champion the tracked player is on.
    pub champion: String,
    /// Present only on result cards.
    pub outcome: Option<MatchOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub win: bool,
    /// "kills/deaths/assists".
    pub kda: String,
}

impl MatchOutcome {
    pub fn label(&self) -> &'static str {
        if self.win {
            "Victory"
        } else {
            "Defeat"
        }
    }
}

/// Match-start announcement for a tracked player.
pub fn game_start(
    riot_id: &str,
    region: &str,
    game: &CurrentGame,
    participant: &CurrentGameParticipant,
    assets: &AssetCatalog,
) -> Notification {
    let url = format!(
        "https://www.deeplol.gg/summoner/{}/{}/ingame",
        deeplol_region(region),
        encode_name(riot_id),
    );
    Notification {
        title: format!("⚔️ {riot_id} started a match!"),
        url,
        thumbnail_url: assets.profile_icon_url(participant.profile_icon_id),
        mode: mode_label(game.game_queue_config_id, &game.game_mode),
        champion: assets.champion_name(participant.champion_id),
        outcome: None,
    }
}

/// Result card that replaces a start announcement once the match finishes.
pub fn match_result(
    game: &InFlightMatch,
    queue_id: Option<i64>,
    game_mode: &str,
    participant: &MatchParticipant,
    assets: &AssetCatalog,
) -> Notification {
    let url = format!(
        "https://www.deeplol.gg/summoner/{}/{}/matches/{}",
        deeplol_region(&game.region),
        encode_name(&game.riot_id),
        game.match_id,
    );
    Notification {
        title: format!("{}'s match is over", game.riot_id),
        url,
        thumbnail_url: assets.profile_icon_url(participant.profile_icon),
        mode: mode_label(queue_id, game_mode),
        champion: assets.champion_name(participant.champion_id),
        outcome: Some(MatchOutcome {
            win: participant.win,
            kda: format!(
                "{}/{}/{}",
                participant.kills, participant.deaths, participant.assists
            ),
        }),
    }
}

/// Queue-id → display label, falling back to the raw mode string.
pub fn mode_label(queue_id: Option<i64>, raw_mode: &str) -> String {
    let label = match queue_id {
        Some(400) => "Normal (Draft)",
        Some(420) => "Ranked Solo/Duo",
        Some(430) => "Normal (Blind)",
        Some(440) => "Ranked Flex",
        Some(450) => "ARAM",
        Some(700) => "Clash",
        Some(1700) => "Arena",
        Some(1900) => "URF",
        _ => {
            return if raw_mode.is_empty() {
                "Unknown mode".to_string()
            } else {
                raw_mode.to_string()
            }
        }
    };
    label.to_string()
}

/// Deep-link region token, falling back to the lowercased region code with
/// trailing digits stripped.
pub fn deeplol_region(region: &str) -> String {
    let token = match region {
        "JP1" => "jp",
        "KR" => "kr",
        "NA1" => "na",
        "EUW1" => "euw",
        "EUN1" => "eune",
        "TR1" => "tr",
        "BR1" => "br",
        "LA1" => "lan",
        "LA2" => "las",
        "OC1" => "oce",
        "RU" => "ru",
        "PH2" => "ph",
        "SG2" => "sg",
        "TH2" => "th",
        "TW2" => "tw",
        "VN2" => "vn",
        other => {
            return other
                .to_ascii_lowercase()
                .trim_end_matches(|c: char| c.is_ascii_digit())
                .to_string()
        }
    };
    token.to_string()
}

// The `#` in a riot id becomes `-` in deeplol paths.
fn encode_name(riot_id: &str) -> String {
    utf8_percent_encode(&riot_id.replace('#', "-"), PATH_SEGMENT).to_string()
}
