// Parsing of podcast RSS documents

use roxmltree::{Document, Node};

use super::{Episode, Feed, FeedError};

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";

/// Parse an RSS document into its title and playable episodes
///
/// Items without a title or an enclosure URL are skipped. Episodes come back
/// oldest first, the reverse of the usual newest-first feed order.
pub fn parse_feed(xml: &str) -> Result<Feed, FeedError> {
    let doc = Document::parse(xml).map_err(|e| FeedError::Parse(e.to_string()))?;

    let channel = doc
        .descendants()
        .find(|n| n.has_tag_name("channel"))
        .ok_or_else(|| FeedError::Parse("Document has no <channel>".to_string()))?;

    let title = plain_child(channel, "title")
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let mut episodes: Vec<Episode> = channel
        .descendants()
        .filter(|n| n.has_tag_name("item"))
        .filter_map(parse_item)
        .collect();
    episodes.reverse();

    Ok(Feed { title, episodes })
}

fn parse_item(item: Node) -> Option<Episode> {
    let title = plain_child(item, "title")?.text()?.trim().to_string();
    if title.is_empty() {
        return None;
    }

    let audio_url = item
        .children()
        .find(|n| n.has_tag_name("enclosure"))?
        .attribute("url")?
        .trim()
        .to_string();
    if audio_url.is_empty() {
        return None;
    }

    let duration = item
        .children()
        .find(|n| n.has_tag_name((ITUNES_NS, "duration")))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Some(Episode {
        title,
        audio_url,
        duration,
    })
}

/// First child element with the given name and no namespace
fn plain_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name && n.tag_name().namespace().is_none())
}

/// Normalize an `itunes:duration` value for display
///
/// `h:mm:ss` and `m:ss` keep their shape with zero padded minutes and seconds;
/// a bare number of seconds is expanded to `h:mm:ss`.
pub fn format_duration(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let parts: Option<Vec<u64>> = raw.split(':').map(parse_part).collect();
    let Some(parts) = parts else {
        return raw.to_string();
    };

    match parts.as_slice() {
        [h, m, s] => format!("{}:{:02}:{:02}", h, m, s),
        [m, s] => format!("{}:{:02}", m, s),
        [total] => {
            let hours = total / 3600;
            let minutes = (total % 3600) / 60;
            let seconds = total % 60;
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        }
        _ => raw.to_string(),
    }
}

fn parse_part(part: &str) -> Option<u64> {
    let part = part.trim();
    part.parse::<u64>().ok().or_else(|| {
        part.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.floor() as u64)
    })
}
