//! HTTP client for the Riot API and Data Dragon.
//!
//! One request primitive does all the outcome classification: a payload, an
//! empty result (HTTP 404, since "no active match" and "no such account" are
//! legitimate answers, not faults), or a classified error. There is no
//! automatic retry; callers treat an error as terminal for the current poll
//! cycle and rely on the next scheduled cycle.

use super::{
    routing, split_riot_id, AccountDto, ApiError, AssetCatalog, CurrentGame, GameApi, MatchDto,
    MatchInfo, ResolveError, PATH_SEGMENT,
};
use async_trait::async_trait;
use percent_encoding::utf8_percent_encode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const VERSIONS_URL: &str = "https://ddragon.leagueoflegends.com/api/versions.json";

pub struct RiotClient {
    client: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl RiotClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            timeout,
        }
    }

    /// Timed-out GET with the auth header. `Ok(None)` means HTTP 404.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, ApiError> {
        let resp = self
            .client
            .get(url)
            .header("X-Riot-Token", &self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_send_error(e, url))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(ApiError::Forbidden);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                url: url.to_string(),
            });
        }

        let payload = resp
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(Some(payload))
    }

    /// Best-effort load of the asset version and champion name table.
    /// Failure degrades champion lookups to placeholders instead of aborting
    /// startup.
    pub async fn fetch_assets(&self) -> AssetCatalog {
        match self.try_fetch_assets().await {
            Ok(catalog) => {
                info!(
                    version = %catalog.version,
                    champions = catalog.champions.len(),
                    "champion catalog loaded"
                );
                catalog
            }
            Err(e) => {
                warn!(error = %e, "champion catalog unavailable, using placeholders");
                AssetCatalog::default()
            }
        }
    }

    async fn try_fetch_assets(&self) -> Result<AssetCatalog, ApiError> {
        let versions: Vec<String> = self
            .get_json(VERSIONS_URL)
            .await?
            .ok_or_else(|| ApiError::Decode("empty versions listing".to_string()))?;
        let version = versions
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Decode("empty versions listing".to_string()))?;

        let url = format!(
            "https://ddragon.leagueoflegends.com/cdn/{version}/data/en_US/champion.json"
        );
        let listing: ChampionListing = self
            .get_json(&url)
            .await?
            .ok_or_else(|| ApiError::Decode("champion listing missing".to_string()))?;

        let mut champions = HashMap::with_capacity(listing.data.len());
        for entry in listing.data.into_values() {
            match entry.key.parse::<i64>() {
                Ok(id) => {
                    champions.insert(id, entry.name);
                }
                Err(_) => debug!(key = %entry.key, "non-numeric champion key skipped"),
            }
        }

        Ok(AssetCatalog { version, champions })
    }
}

#[async_trait]
impl GameApi for RiotClient {
    async fn resolve_account(&self, riot_id: &str, region: &str) -> Result<String, ResolveError> {
        let (name, tag) = split_riot_id(riot_id)?;
        let routes =
            routing(region).ok_or_else(|| ResolveError::UnknownRegion(region.to_string()))?;

        let url = format!(
            "https://{}.api.riotgames.com/riot/account/v1/accounts/by-riot-id/{}/{}",
            routes.continental,
            utf8_percent_encode(name, PATH_SEGMENT),
            utf8_percent_encode(tag, PATH_SEGMENT),
        );
        let account: Option<AccountDto> = self.get_json(&url).await?;
        match account {
            Some(account) => Ok(account.puuid),
            None => Err(ResolveError::NotFound),
        }
    }

    async fn active_game(
        &self,
        puuid: &str,
        region: &str,
    ) -> Result<Option<CurrentGame>, ApiError> {
        let Some(routes) = routing(region) else {
            warn!(region = %region, "unknown region on active-game lookup");
            return Ok(None);
        };
        let url = format!(
            "https://{}.api.riotgames.com/lol/spectator/v5/active-games/by-summoner/{}",
            routes.platform, puuid
        );
        match self.get_json(&url).await {
            Ok(game) => Ok(game),
            Err(e) => {
                error!(puuid = %puuid, error = %e, "active-game lookup failed");
                Err(e)
            }
        }
    }

    async fn match_result(
        &self,
        match_id: &str,
        region: &str,
    ) -> Result<Option<MatchInfo>, ApiError> {
        let Some(routes) = routing(region) else {
            warn!(region = %region, "unknown region on match-result lookup");
            return Ok(None);
        };
        let url = format!(
            "https://{}.api.riotgames.com/lol/match/v5/matches/{}",
            routes.continental, match_id
        );
        match self.get_json::<MatchDto>(&url).await {
            Ok(dto) => Ok(dto.map(|d| d.info)),
            Err(e) => {
                error!(match_id = %match_id, error = %e, "match-result lookup failed");
                Err(e)
            }
        }
    }
}

fn classify_send_error(e: reqwest::Error, url: &str) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout {
            url: url.to_string(),
        }
    } else {
        ApiError::Transport(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ChampionListing {
    data: HashMap<String, ChampionEntry>,
}

#[derive(Debug, Deserialize)]
struct ChampionEntry {
    key: String,
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Validation happens before any HTTP call, so these run without a server.
    #[tokio::test]
    async fn resolve_rejects_malformed_riot_id() {
        let client = RiotClient::new("key".to_string(), Duration::from_secs(1));
        let err = client.resolve_account("Faker", "KR").await.unwrap_err();
        assert!(matches!(err, ResolveError::MalformedRiotId));
    }

    #[tokio::test]
    async fn resolve_rejects_unknown_region() {
        let client = RiotClient::new("key".to_string(), Duration::from_secs(1));
        let err = client.resolve_account("Faker#KR1", "MOON").await.unwrap_err();
        match err {
            ResolveError::UnknownRegion(region) => assert_eq!(region, "MOON"),
            other => panic!("expected UnknownRegion, got {other:?}"),
        }
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        let encoded = utf8_percent_encode("Hide on bush", PATH_SEGMENT).to_string();
        assert_eq!(encoded, "Hide%20on%20bush");
    }

    #[test]
    fn champion_listing_decodes() {
        let listing: ChampionListing = serde_json::from_str(
            r#"{"data": {"Aatrox": {"key": "266", "name": "Aatrox"}}}"#,
        )
        .unwrap();
        assert_eq!(listing.data["Aatrox"].name, "Aatrox");
    }
}
