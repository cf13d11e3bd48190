//! Stream analysis.
//!
//! Health checks classify streams by probing them with ffprobe (stream
//! structure) and ffmpeg's blackdetect filter (black-frame ratio). The
//! analyzer sits behind a trait so the monitor can be exercised without
//! the binaries installed.

use crate::models::{HealthCheckResult, StreamAnalysis};
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::error;

#[async_trait]
pub trait StreamAnalyzer: Send + Sync {
    /// Classify a stream within roughly `duration_seconds` of analysis.
    async fn analyze(
        &self,
        stream_url: &str,
        duration_seconds: u32,
        user_agent: &str,
        black_screen_threshold: f64,
    ) -> StreamAnalysis;
}

/// ffprobe/ffmpeg-backed analyzer.
pub struct FfprobeAnalyzer;

impl FfprobeAnalyzer {
    pub fn new() -> Self {
        Self
    }

    async fn probe_streams(
        &self,
        stream_url: &str,
        duration_seconds: u32,
        user_agent: &str,
    ) -> Result<serde_json::Value, StreamAnalysis> {
        let timeout_micros = (duration_seconds as u64) * 1_000_000;
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-user_agent",
                user_agent,
                "-timeout",
                &timeout_micros.to_string(),
                "-show_streams",
                "-show_format",
                "-print_format",
                "json",
                "-i",
                stream_url,
            ])
            .output();

        let output = match tokio::time::timeout(
            Duration::from_secs(duration_seconds as u64 + 10),
            output,
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("ffprobe not found - install ffmpeg to enable health checks");
                return Err(StreamAnalysis::failure(
                    HealthCheckResult::Skipped,
                    "ffprobe not installed",
                ));
            }
            Ok(Err(e)) => {
                return Err(StreamAnalysis::failure(
                    HealthCheckResult::InvalidStream,
                    truncate(&e.to_string()),
                ));
            }
            Err(_) => {
                return Err(StreamAnalysis::failure(
                    HealthCheckResult::Timeout,
                    format!("Analysis timed out after {duration_seconds} seconds"),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_probe_error(&stderr));
        }

        serde_json::from_slice(&output.stdout).map_err(|_| {
            StreamAnalysis::failure(
                HealthCheckResult::InvalidStream,
                "Could not parse ffprobe output",
            )
        })
    }

    /// Ratio of black time over the analysis window via ffmpeg blackdetect,
    /// or None when detection fails.
    async fn detect_black_screen(
        &self,
        stream_url: &str,
        duration_seconds: u32,
        user_agent: &str,
    ) -> Option<f64> {
        let output = Command::new("ffmpeg")
            .args([
                "-user_agent",
                user_agent,
                "-t",
                &duration_seconds.to_string(),
                "-i",
                stream_url,
                "-vf",
                "blackdetect=d=0.1:pix_th=0.10",
                "-an",
                "-f",
                "null",
                "-",
            ])
            .output();

        let output = tokio::time::timeout(
            Duration::from_secs(duration_seconds as u64 + 15),
            output,
        )
        .await
        .ok()?
        .ok()?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let re = Regex::new(r"black_duration:([\d.]+)").unwrap();
        let black_total: f64 = re
            .captures_iter(&stderr)
            .filter_map(|c| c[1].parse::<f64>().ok())
            .sum();

        if duration_seconds > 0 {
            Some((black_total / duration_seconds as f64).min(1.0))
        } else {
            None
        }
    }
}

impl Default for FfprobeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamAnalyzer for FfprobeAnalyzer {
    async fn analyze(
        &self,
        stream_url: &str,
        duration_seconds: u32,
        user_agent: &str,
        black_screen_threshold: f64,
    ) -> StreamAnalysis {
        let started = Instant::now();

        let mut analysis = match self
            .probe_streams(stream_url, duration_seconds, user_agent)
            .await
        {
            Ok(probe_data) => {
                let streams = probe_data
                    .get("streams")
                    .and_then(|s| s.as_array())
                    .cloned()
                    .unwrap_or_default();
                let video: Vec<&serde_json::Value> = streams
                    .iter()
                    .filter(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some("video"))
                    .collect();
                let audio_count = streams
                    .iter()
                    .filter(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some("audio"))
                    .count();

                if video.is_empty() && audio_count == 0 {
                    StreamAnalysis {
                        result: HealthCheckResult::InvalidStream,
                        http_status_code: None,
                        error_message: Some("No video or audio streams found".to_string()),
                        analysis_details: Some(json!({ "streams_found": streams.len() })),
                        check_duration_ms: 0,
                    }
                } else if video.is_empty() {
                    StreamAnalysis {
                        result: HealthCheckResult::AudioOnly,
                        http_status_code: None,
                        error_message: Some("Stream has audio but no video".to_string()),
                        analysis_details: Some(json!({
                            "audio_streams": audio_count,
                            "video_streams": 0,
                        })),
                        check_duration_ms: 0,
                    }
                } else {
                    let black_ratio = self
                        .detect_black_screen(stream_url, duration_seconds, user_agent)
                        .await;

                    let details = json!({
                        "video_streams": video.len(),
                        "audio_streams": audio_count,
                        "video_codec": video[0].get("codec_name"),
                        "resolution": match (
                            video[0].get("width").and_then(|w| w.as_i64()),
                            video[0].get("height").and_then(|h| h.as_i64()),
                        ) {
                            (Some(w), Some(h)) => Some(format!("{w}x{h}")),
                            _ => None,
                        },
                        "black_frame_ratio": black_ratio,
                    });

                    match black_ratio {
                        Some(ratio) if ratio >= black_screen_threshold => StreamAnalysis {
                            result: HealthCheckResult::BlackScreen,
                            http_status_code: None,
                            error_message: Some(format!(
                                "Black screen detected ({:.1}% black frames)",
                                ratio * 100.0
                            )),
                            analysis_details: Some(details),
                            check_duration_ms: 0,
                        },
                        _ => StreamAnalysis {
                            result: HealthCheckResult::Success,
                            http_status_code: None,
                            error_message: None,
                            analysis_details: Some(details),
                            check_duration_ms: 0,
                        },
                    }
                }
            }
            Err(failure) => failure,
        };

        analysis.check_duration_ms = started.elapsed().as_millis() as i64;
        analysis
    }
}

fn classify_probe_error(stderr: &str) -> StreamAnalysis {
    let lower = stderr.to_lowercase();

    if lower.contains("connection refused") || lower.contains("connection reset") {
        StreamAnalysis::failure(HealthCheckResult::ConnectionFailed, truncate(stderr))
    } else if lower.contains("timed out") || lower.contains("timeout") {
        StreamAnalysis::failure(HealthCheckResult::Timeout, truncate(stderr))
    } else if stderr.contains("404") || stderr.contains("403") {
        let http_code = Regex::new(r"HTTP error (\d+)")
            .unwrap()
            .captures(stderr)
            .and_then(|c| c[1].parse::<i32>().ok());
        let mut analysis =
            StreamAnalysis::failure(HealthCheckResult::HttpError, truncate(stderr));
        analysis.http_status_code = http_code;
        analysis
    } else {
        StreamAnalysis::failure(HealthCheckResult::InvalidStream, truncate(stderr))
    }
}

fn truncate(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.len() > 500 {
        trimmed.chars().take(500).collect()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_probe_errors() {
        assert_eq!(
            classify_probe_error("Connection refused").result,
            HealthCheckResult::ConnectionFailed
        );
        assert_eq!(
            classify_probe_error("operation timed out").result,
            HealthCheckResult::Timeout
        );

        let http = classify_probe_error("Server returned 404: HTTP error 404 Not Found");
        assert_eq!(http.result, HealthCheckResult::HttpError);
        assert_eq!(http.http_status_code, Some(404));

        assert_eq!(
            classify_probe_error("moov atom not found").result,
            HealthCheckResult::InvalidStream
        );
    }
}
