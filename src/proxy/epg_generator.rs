//! XMLTV output.
//!
//! Writes a parsed/assembled `XmltvDocument` back to standards-compliant
//! XMLTV 1.0, and assembles guide documents for an account's mapped
//! channels. PPV channels carrying a live event title get a synthesized
//! all-day programme so players show what the slot is carrying.

use crate::database::Database;
use crate::ingestor::xmltv::{XmltvChannel, XmltvDocument, XmltvProgramme};
use crate::models::*;
use crate::epg::ppv::ppv_event_title;
use crate::utils::datetime::format_xmltv_datetime;
use anyhow::Result;
use chrono::{Duration, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// Serialize a document as XMLTV. Round-trips with the parser.
pub fn write_xmltv(document: &XmltvDocument) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut tv = BytesStart::new("tv");
    tv.push_attribute(("generator-info-name", "iptv-hub"));
    writer.write_event(Event::Start(tv))?;

    for channel in &document.channels {
        let mut start = BytesStart::new("channel");
        start.push_attribute(("id", channel.id.as_str()));
        writer.write_event(Event::Start(start))?;

        for name in &channel.display_names {
            writer.write_event(Event::Start(BytesStart::new("display-name")))?;
            writer.write_event(Event::Text(BytesText::new(name)))?;
            writer.write_event(Event::End(BytesEnd::new("display-name")))?;
        }

        if let Some(icon) = &channel.icon {
            let mut icon_start = BytesStart::new("icon");
            icon_start.push_attribute(("src", icon.as_str()));
            writer.write_event(Event::Empty(icon_start))?;
        }

        if let Some(url) = &channel.url {
            writer.write_event(Event::Start(BytesStart::new("url")))?;
            writer.write_event(Event::Text(BytesText::new(url)))?;
            writer.write_event(Event::End(BytesEnd::new("url")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("channel")))?;
    }

    for programme in &document.programmes {
        let mut start = BytesStart::new("programme");
        start.push_attribute(("channel", programme.channel.as_str()));
        if let Some(start_time) = programme.start {
            start.push_attribute(("start", format_xmltv_datetime(start_time).as_str()));
        }
        if let Some(stop_time) = programme.stop {
            start.push_attribute(("stop", format_xmltv_datetime(stop_time).as_str()));
        }
        writer.write_event(Event::Start(start))?;

        if let Some(title) = &programme.title {
            writer.write_event(Event::Start(BytesStart::new("title")))?;
            writer.write_event(Event::Text(BytesText::new(title)))?;
            writer.write_event(Event::End(BytesEnd::new("title")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("programme")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("tv")))?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

pub struct EpgGenerator {
    db: Database,
}

impl EpgGenerator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Assemble a guide document for an account's visible channels: one
    /// `channel` element per mapped channel, plus synthesized all-day
    /// programmes for PPV channels with a live event.
    pub async fn build_guide(&self, account: &Account) -> Result<XmltvDocument> {
        let mut document = XmltvDocument::default();

        let channels = self.db.list_playlist_channels(account.id).await?;
        let channel_ids: Vec<uuid::Uuid> = channels.iter().map(|(c, _)| c.id).collect();
        let mappings = self.db.mappings_for_channels(&channel_ids).await?;

        for (channel, _) in &channels {
            let display_name = channel
                .cleaned_name
                .clone()
                .unwrap_or_else(|| channel.name.clone());

            if let Some(mapping) = mappings.get(&channel.id) {
                if let Some(epg_channel) = self.db.get_epg_channel(mapping.epg_channel_id).await? {
                    document.channels.push(XmltvChannel {
                        id: epg_channel.channel_id.clone(),
                        display_names: epg_channel.display_names(),
                        icon: epg_channel.icon_url.clone(),
                        url: epg_channel.url.clone(),
                    });
                    continue;
                }
            }

            // PPV slots with a live event synthesize their own guide entry
            if channel.is_ppv {
                if let Some(title) = ppv_event_title(&channel.name) {
                    let channel_id = format!("ppv.{}.{}", account.id, channel.stream_id);
                    let start = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
                    document.channels.push(XmltvChannel {
                        id: channel_id.clone(),
                        display_names: vec![display_name],
                        icon: channel.stream_icon.clone(),
                        url: None,
                    });
                    document.programmes.push(XmltvProgramme {
                        channel: channel_id,
                        start: Some(start),
                        stop: Some(start + Duration::hours(24)),
                        title: Some(title),
                    });
                }
            }
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestor::xmltv::parse_xmltv;
    use crate::utils::datetime::parse_xmltv_datetime;

    #[test]
    fn emitted_document_reparses_identically() {
        let document = XmltvDocument {
            channels: vec![
                XmltvChannel {
                    id: "KECI-DT.us_locals1".to_string(),
                    display_names: vec!["KECI".to_string(), "NBC Missoula".to_string()],
                    icon: Some("http://logos.example/keci.png".to_string()),
                    url: Some("http://keci.example".to_string()),
                },
                XmltvChannel {
                    id: "ESPN.us".to_string(),
                    display_names: vec!["ESPN".to_string()],
                    icon: None,
                    url: None,
                },
            ],
            programmes: vec![XmltvProgramme {
                channel: "ESPN.us".to_string(),
                start: parse_xmltv_datetime("20231215120000 +0000"),
                stop: parse_xmltv_datetime("20231215140000 +0000"),
                title: Some("SportsCenter".to_string()),
            }],
        };

        let emitted = write_xmltv(&document).unwrap();
        let reparsed = parse_xmltv(&emitted).unwrap();

        assert_eq!(reparsed, document);
    }
}
