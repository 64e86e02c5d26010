//! Syntactic gate applied to every incoming media URL before the provider is
//! contacted.

use url::Url;

/// Hosts on which the video id is carried by the `v` query parameter.
const QUERY_HOSTS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "gaming.youtube.com",
];

/// Hosts on which the video id may be carried by the path.
const PATH_HOSTS: [&str; 2] = ["youtube.com", "www.youtube.com"];
const PATH_PREFIXES: [&str; 4] = ["embed", "v", "shorts", "live"];
const SHORT_HOST: &str = "youtu.be";

const VIDEO_ID_LEN: usize = 11;

/// Returns true when `input` is a YouTube video URL the provider can resolve.
///
/// Pure and synchronous: no network access happens here.
pub fn is_valid_media_url(input: &str) -> bool {
    video_id(input).is_some()
}

/// Extracts the 11 character video id from a supported URL.
pub fn video_id(input: &str) -> Option<String> {
    let parsed = Url::parse(input.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();

    let from_query = parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty());

    let candidate = match from_query {
        Some(id) if QUERY_HOSTS.contains(&host.as_str()) => id,
        Some(_) => return None,
        None => id_from_path(&parsed, &host)?,
    };

    let truncated: String = candidate.chars().take(VIDEO_ID_LEN).collect();
    is_valid_video_id(&truncated).then_some(truncated)
}

fn id_from_path(parsed: &Url, host: &str) -> Option<String> {
    let mut segments = parsed.path_segments()?;
    if host == SHORT_HOST {
        return segments
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned);
    }
    if !PATH_HOSTS.contains(&host) {
        return None;
    }
    let prefix = segments.next()?;
    if !PATH_PREFIXES.contains(&prefix) {
        return None;
    }
    segments
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
}

fn is_valid_video_id(id: &str) -> bool {
    id.len() == VIDEO_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
