//! XMLTV parsing.
//!
//! Parses `channel` and `programme` elements into an in-memory document,
//! and folds the document into per-channel upsert records with programme
//! counts and time ranges.

use crate::models::EpgChannelUpsert;
use crate::utils::datetime::parse_xmltv_datetime;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmltvChannel {
    pub id: String,
    pub display_names: Vec<String>,
    pub icon: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmltvProgramme {
    pub channel: String,
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmltvDocument {
    pub channels: Vec<XmltvChannel>,
    pub programmes: Vec<XmltvProgramme>,
}

/// Parse XMLTV content. Unknown elements are skipped; channels without an
/// id are dropped.
pub fn parse_xmltv(content: &str) -> Result<XmltvDocument> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut document = XmltvDocument::default();
    let mut current_channel: Option<XmltvChannel> = None;
    let mut current_programme: Option<XmltvProgramme> = None;
    // Element we are collecting text for: display-name, url or title
    let mut text_target: Option<Vec<u8>> = None;
    let mut buffer = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buffer)
            .map_err(|e| anyhow!("Invalid XMLTV: {}", e))?
        {
            Event::Start(e) => match e.name().as_ref() {
                b"channel" => {
                    let mut channel = XmltvChannel::default();
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"id" {
                            channel.id = attr.unescape_value()?.into_owned();
                        }
                    }
                    current_channel = Some(channel);
                }
                b"programme" => {
                    let mut programme = XmltvProgramme::default();
                    for attr in e.attributes().flatten() {
                        let value = attr.unescape_value()?.into_owned();
                        match attr.key.as_ref() {
                            b"channel" => programme.channel = value,
                            b"start" => programme.start = parse_xmltv_datetime(&value),
                            b"stop" => programme.stop = parse_xmltv_datetime(&value),
                            _ => {}
                        }
                    }
                    current_programme = Some(programme);
                }
                b"display-name" | b"url" | b"title" => {
                    text_target = Some(e.name().as_ref().to_vec());
                }
                b"icon" => {
                    if let Some(channel) = current_channel.as_mut() {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"src" {
                                channel.icon = Some(attr.unescape_value()?.into_owned());
                            }
                        }
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"icon" {
                    if let Some(channel) = current_channel.as_mut() {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"src" {
                                channel.icon = Some(attr.unescape_value()?.into_owned());
                            }
                        }
                    }
                }
            }
            Event::Text(e) => {
                let Some(target) = text_target.as_deref() else {
                    continue;
                };
                let text = e.unescape()?.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match target {
                    b"display-name" => {
                        if let Some(channel) = current_channel.as_mut() {
                            channel.display_names.push(text);
                        }
                    }
                    b"url" => {
                        if let Some(channel) = current_channel.as_mut() {
                            channel.url = Some(text);
                        }
                    }
                    b"title" => {
                        if let Some(programme) = current_programme.as_mut() {
                            programme.title = Some(text);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"channel" => {
                    if let Some(channel) = current_channel.take() {
                        if !channel.id.is_empty() {
                            document.channels.push(channel);
                        }
                    }
                }
                b"programme" => {
                    if let Some(programme) = current_programme.take() {
                        if !programme.channel.is_empty() {
                            document.programmes.push(programme);
                        }
                    }
                }
                b"display-name" | b"url" | b"title" => {
                    text_target = None;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buffer.clear();
    }

    Ok(document)
}

/// Fold a parsed document into per-channel upsert records with programme
/// counts and first/last programme times.
pub fn to_channel_upserts(document: &XmltvDocument) -> Vec<EpgChannelUpsert> {
    let mut programme_stats: HashMap<&str, (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> =
        HashMap::new();

    for programme in &document.programmes {
        let entry = programme_stats
            .entry(programme.channel.as_str())
            .or_insert((0, None, None));
        entry.0 += 1;
        for time in [programme.start, programme.stop].into_iter().flatten() {
            entry.1 = Some(entry.1.map_or(time, |first| first.min(time)));
            entry.2 = Some(entry.2.map_or(time, |last| last.max(time)));
        }
    }

    document
        .channels
        .iter()
        .map(|channel| {
            let (program_count, first_program, last_program) = programme_stats
                .get(channel.id.as_str())
                .copied()
                .unwrap_or((0, None, None));
            EpgChannelUpsert {
                channel_id: channel.id.clone(),
                display_name: channel
                    .display_names
                    .first()
                    .cloned()
                    .unwrap_or_else(|| channel.id.clone()),
                display_names: channel.display_names.clone(),
                icon_url: channel.icon.clone(),
                url: channel.url.clone(),
                program_count,
                first_program,
                last_program,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="test">
  <channel id="KECI-DT.us_locals1">
    <display-name>KECI</display-name>
    <display-name>NBC Missoula</display-name>
    <icon src="http://logos.example/keci.png"/>
  </channel>
  <channel id="ESPN.us">
    <display-name>ESPN</display-name>
  </channel>
  <programme channel="KECI-DT.us_locals1" start="20231215120000 +0000" stop="20231215130000 +0000">
    <title>Noon News</title>
  </programme>
  <programme channel="KECI-DT.us_locals1" start="20231215130000 +0000" stop="20231215140000 +0000">
    <title>Afternoon Show</title>
  </programme>
</tv>"#;

    #[test]
    fn parses_channels_and_programmes() {
        let document = parse_xmltv(SAMPLE).unwrap();
        assert_eq!(document.channels.len(), 2);
        assert_eq!(document.programmes.len(), 2);

        let keci = &document.channels[0];
        assert_eq!(keci.id, "KECI-DT.us_locals1");
        assert_eq!(keci.display_names, vec!["KECI", "NBC Missoula"]);
        assert_eq!(keci.icon.as_deref(), Some("http://logos.example/keci.png"));
    }

    #[test]
    fn folds_programme_stats_per_channel() {
        let document = parse_xmltv(SAMPLE).unwrap();
        let upserts = to_channel_upserts(&document);

        let keci = upserts.iter().find(|u| u.channel_id == "KECI-DT.us_locals1").unwrap();
        assert_eq!(keci.program_count, 2);
        assert!(keci.first_program.unwrap() < keci.last_program.unwrap());

        let espn = upserts.iter().find(|u| u.channel_id == "ESPN.us").unwrap();
        assert_eq!(espn.program_count, 0);
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(parse_xmltv("<tv><channel id=\"x\">").is_err());
    }
}
