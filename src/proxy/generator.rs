//! M3U playlist generation.
//!
//! Emits visible, active channels as `#EXTINF` entries pointing at this
//! service's proxied stream URLs. A channel's `tvg-id` resolves through its
//! EPG mapping, or through its channel link's source mapping for
//! time-shifted twins.

use crate::database::Database;
use crate::models::*;
use anyhow::Result;
use std::collections::HashMap;
use tracing::info;

pub struct PlaylistGenerator {
    db: Database,
}

impl PlaylistGenerator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Generate a playlist over the given accounts. With more than one
    /// account, group titles carry the account name in parentheses.
    pub async fn generate(&self, accounts: &[Account], base_url: &str) -> Result<String> {
        let multi_account = accounts.len() > 1;
        let base_url = base_url.trim_end_matches('/');
        let mut playlist = String::from("#EXTM3U\n");
        let mut total = 0usize;

        for account in accounts {
            let channels = self.db.list_playlist_channels(account.id).await?;
            if channels.is_empty() {
                continue;
            }

            let channel_ids: Vec<uuid::Uuid> = channels.iter().map(|(c, _)| c.id).collect();
            let mappings = self.db.mappings_for_channels(&channel_ids).await?;

            // Resolve EPG ids, following channel links for unmapped channels
            let mut tvg_ids: HashMap<uuid::Uuid, String> = HashMap::new();
            for (channel, _) in &channels {
                if let Some(epg_id) = self.resolve_tvg_id(channel, &mappings).await? {
                    tvg_ids.insert(channel.id, epg_id);
                }
            }

            for (channel, category_name) in &channels {
                let display_name = channel.cleaned_name.as_deref().unwrap_or(&channel.name);
                let tvg_id = tvg_ids.get(&channel.id).map(String::as_str).unwrap_or("");
                let tvg_logo = channel.stream_icon.as_deref().unwrap_or("");
                let group_title = if multi_account {
                    format!("{} ({})", category_name, account.name)
                } else {
                    category_name.clone()
                };

                playlist.push_str(&format!(
                    "#EXTINF:-1 tvg-id=\"{}\" tvg-name=\"{}\" tvg-logo=\"{}\" group-title=\"{}\",{}\n",
                    escape_attr(tvg_id),
                    escape_attr(display_name),
                    escape_attr(tvg_logo),
                    escape_attr(&group_title),
                    display_name
                ));
                playlist.push_str(&format!(
                    "{}/stream/{}/{}.ts\n",
                    base_url, account.id, channel.stream_id
                ));
                total += 1;
            }
        }

        info!("Generated playlist with {} channels", total);
        Ok(playlist)
    }

    /// The XMLTV channel id a playlist entry should reference: its own
    /// mapping, else its link source's mapping.
    async fn resolve_tvg_id(
        &self,
        channel: &Channel,
        mappings: &HashMap<uuid::Uuid, ChannelEpgMapping>,
    ) -> Result<Option<String>> {
        if let Some(mapping) = mappings.get(&channel.id) {
            if let Some(epg_channel) = self.db.get_epg_channel(mapping.epg_channel_id).await? {
                return Ok(Some(epg_channel.channel_id));
            }
        }

        if let Some(link) = self.db.get_link_for_channel(channel.id).await? {
            if let Some(mapping) = self.db.get_mapping_for_channel(link.source_channel_id).await? {
                if let Some(epg_channel) = self.db.get_epg_channel(mapping.epg_channel_id).await? {
                    return Ok(Some(epg_channel.channel_id));
                }
            }
        }

        Ok(None)
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('"', "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_quotes_are_neutralized() {
        assert_eq!(escape_attr("The \"Best\" Channel"), "The 'Best' Channel");
        assert_eq!(escape_attr("plain"), "plain");
    }
}
