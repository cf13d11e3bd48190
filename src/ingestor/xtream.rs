//! Xtream Codes API client.
//!
//! All catalog traffic goes through `player_api.php`; EPG bytes come from
//! `xmltv.php`. Providers are wildly inconsistent about field types
//! (numbers arrive as strings and vice versa), so ids and counters are
//! deserialized leniently.

use crate::errors::SourceError;
use crate::utils::normalize_server_url;
use anyhow::Result;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);
const XMLTV_TIMEOUT: Duration = Duration::from_secs(120);

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

fn lenient_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64().map(|n| n as i32),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct XtreamCategory {
    #[serde(default, deserialize_with = "lenient_string")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XtreamStream {
    #[serde(default, deserialize_with = "lenient_string")]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default)]
    pub epg_channel_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub added: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub custom_sid: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub tv_archive: Option<i32>,
    #[serde(default)]
    pub direct_source: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub tv_archive_duration: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XtreamUserInfo {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub exp_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub max_connections: Option<i32>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub active_cons: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XtreamAuthResponse {
    #[serde(default)]
    pub user_info: Option<XtreamUserInfo>,
}

pub struct XtreamClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl XtreamClient {
    pub fn new(server: &str, username: &str, password: &str, user_agent: &str) -> Result<Self> {
        let base_url = normalize_server_url(server);
        url::Url::parse(&base_url)
            .map_err(|e| SourceError::InvalidConfig {
                field: "server".to_string(),
                message: e.to_string(),
            })?;

        let client = Client::builder()
            .timeout(CATALOG_TIMEOUT)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    async fn player_api(&self, action: Option<&str>) -> Result<serde_json::Value> {
        let url = format!("{}/player_api.php", self.base_url);
        let mut params = vec![
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];
        if let Some(action) = action {
            params.push(("action", action));
        }

        debug!("Xtream request to {} with action={:?}", url, action);

        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                message: format!("player_api action {:?}", action),
            }
            .into());
        }

        Ok(response.json().await?)
    }

    /// Authenticate and fetch provider-reported account limits.
    pub async fn authenticate(&self) -> Result<XtreamAuthResponse> {
        let value = self.player_api(None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_live_categories(&self) -> Result<Vec<XtreamCategory>> {
        let value = self.player_api(Some("get_live_categories")).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_live_streams(&self) -> Result<Vec<XtreamStream>> {
        let value = self.player_api(Some("get_live_streams")).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_vod_categories(&self) -> Result<Vec<XtreamCategory>> {
        let value = self.player_api(Some("get_vod_categories")).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_vod_streams(&self) -> Result<Vec<serde_json::Value>> {
        let value = self.player_api(Some("get_vod_streams")).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_series_categories(&self) -> Result<Vec<XtreamCategory>> {
        let value = self.player_api(Some("get_series_categories")).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_series(&self) -> Result<Vec<serde_json::Value>> {
        let value = self.player_api(Some("get_series")).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Raw XMLTV bytes from the provider's EPG endpoint.
    pub async fn get_xmltv(&self) -> Result<Bytes> {
        let url = format!("{}/xmltv.php", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .timeout(XMLTV_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                message: "xmltv.php".to_string(),
            }
            .into());
        }

        Ok(response.bytes().await?)
    }

    /// Upstream live-stream URL for a catalog stream id. The proxy opens
    /// this itself and relays bytes; it is never handed to clients.
    pub fn stream_url(&self, stream_id: &str) -> String {
        format!(
            "{}/live/{}/{}/{}.ts",
            self.base_url,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            stream_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_fields_accept_numbers_and_strings() {
        let raw = r#"{"stream_id": 42, "name": "ESPN", "category_id": "7", "tv_archive": "1"}"#;
        let stream: XtreamStream = serde_json::from_str(raw).unwrap();
        assert_eq!(stream.stream_id.as_deref(), Some("42"));
        assert_eq!(stream.category_id.as_deref(), Some("7"));
        assert_eq!(stream.tv_archive, Some(1));
    }

    #[test]
    fn stream_url_embeds_credentials() {
        let client = XtreamClient::new("provider.example:8080", "user", "p@ss", "okhttp/3.14.9").unwrap();
        assert_eq!(
            client.stream_url("99"),
            "http://provider.example:8080/live/user/p%40ss/99.ts"
        );
    }
}
