pub mod error;
pub mod types;

pub use error::{HiscoresError, Result};
pub use types::{ActivityEntry, PlayerListing, SkillEntry};

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

const LISTING_PATH: &str = "index_lite.json";

pub struct HiscoresClient {
    client: reqwest::Client,
    base_url: String,
}

impl HiscoresClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the current listing for one player.
    ///
    /// A 404 means the player is not on the listing at all (unranked everywhere,
    /// renamed, or banned) and maps to `HiscoresError::NotFound`.
    pub async fn player(&self, name: &str) -> Result<PlayerListing> {
        let url = format!("{}/{}", self.base_url, LISTING_PATH);
        let resp = self
            .client
            .get(&url)
            .query(&[("player", name)])
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HiscoresError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HiscoresError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let listing = parse_listing(&body)?;
        debug!(
            player = name,
            skills = listing.skills.len(),
            activities = listing.activities.len(),
            "Fetched hiscores listing"
        );
        Ok(listing)
    }
}

/// Decode an `index_lite.json` body.
pub fn parse_listing(body: &str) -> Result<PlayerListing> {
    Ok(serde_json::from_str(body)?)
}
