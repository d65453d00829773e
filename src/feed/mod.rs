// Podcast feeds
// This module handles feed sources, RSS parsing and episode listing

pub mod parser;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::fetch::{FetchError, TrackFetcher};

pub use parser::{format_duration, parse_feed};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to parse feed: {0}")]
    Parse(String),
}

/// A subscribed feed as stored in settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Feeds offered before the user adds any of their own
pub fn default_feeds() -> Vec<FeedSource> {
    vec![
        FeedSource::new("Lateralcast", "https://feeds.megaphone.fm/lateralcast"),
        FeedSource::new("Colbey", "https://media.rss.com/colbey/feed.xml"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    pub audio_url: String,
    /// Raw `itunes:duration` value
    pub duration: Option<String>,
}

impl Episode {
    pub fn formatted_duration(&self) -> String {
        self.duration.as_deref().map(format_duration).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub title: String,
    pub episodes: Vec<Episode>,
}

/// Download and parse a feed
pub async fn fetch_feed<F: TrackFetcher + ?Sized>(
    fetcher: &F,
    source: &FeedSource,
) -> Result<Feed, FeedError> {
    let bytes = fetcher.fetch(&source.url).await?;
    let text = String::from_utf8_lossy(&bytes);
    let mut feed = parse_feed(&text)?;
    if feed.title.is_empty() {
        feed.title = source.name.clone();
    }
    info!("Loaded {} episodes from {}", feed.episodes.len(), source.name);
    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticFetcher(&'static str);

    #[async_trait]
    impl TrackFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            Ok(self.0.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn test_fetch_feed_falls_back_to_source_name() {
        let fetcher = StaticFetcher(
            r#"<rss><channel><item><title>Only</title><enclosure url="a.mp3"/></item></channel></rss>"#,
        );
        let feed = fetch_feed(&fetcher, &FeedSource::new("My Show", "https://x/feed"))
            .await
            .unwrap();
        assert_eq!(feed.title, "My Show");
        assert_eq!(feed.episodes.len(), 1);
        assert_eq!(feed.episodes[0].formatted_duration(), "");
    }

    #[test]
    fn test_default_feeds() {
        let feeds = default_feeds();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].name, "Lateralcast");
    }
}
