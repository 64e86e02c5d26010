//! HTML served by the relay: an entry form and a page listing the renditions
//! of one kind.

use url::form_urlencoded;

use crate::config::SelectionMode;
use crate::formats::ResolvedFormats;
use crate::media::MediaKind;

const PAGE_TITLE: &str = "YT Media Extractor";

pub fn entry_form() -> String {
    layout(
        PAGE_TITLE,
        r#"<form action="/validate" method="get">
            <label for="url">YouTube URL:</label><br>
            <input type="text" id="url" name="url" required><br><br>
            <input type="radio" id="audio" name="type" value="audio">
            <label for="audio">Audio</label>
            <input type="radio" id="video" name="type" value="video" checked>
            <label for="video">Video</label><br><br>
            <button type="submit">Show formats</button>
        </form>"#,
    )
}

/// Lists the renditions of `resolved` in a form that submits to `/download`.
///
/// With [`SelectionMode::Rendition`] each option carries the rendition id,
/// otherwise its position in the list.
pub fn format_choices(url: &str, resolved: &ResolvedFormats, mode: SelectionMode) -> String {
    let other_kind = match resolved.kind {
        MediaKind::Audio => MediaKind::Video,
        MediaKind::Video => MediaKind::Audio,
    };

    let mut body = format!("<h2>{}</h2>\n", escape_html(&resolved.title));

    if resolved.formats.is_empty() {
        body.push_str(&format!("<p>No {} formats available.</p>\n", resolved.kind));
    } else {
        let field = match mode {
            SelectionMode::Rendition => "rendition",
            SelectionMode::Index => "format",
        };
        let options: String = resolved
            .formats
            .iter()
            .enumerate()
            .map(|(index, format)| {
                let value = match mode {
                    SelectionMode::Rendition => escape_html(&format.rendition_id),
                    SelectionMode::Index => index.to_string(),
                };
                format!(
                    "<option value=\"{value}\">{index}: {}</option>\n",
                    escape_html(&format.label())
                )
            })
            .collect();

        body.push_str(&format!(
            r#"<form action="/download" method="get">
<input type="hidden" name="url" value="{url}">
<input type="hidden" name="type" value="{kind}">
<label for="{field}">Select Format:</label><br>
<select id="{field}" name="{field}" required>
{options}</select><br><br>
<button type="submit">Download</button>
</form>
"#,
            url = escape_html(url),
            kind = resolved.kind,
        ));
    }

    body.push_str(&format!(
        "<p><a href=\"/validate?url={}&amp;type={other_kind}\">\
         Show {other_kind} formats instead</a></p>\n",
        encode_query(url)
    ));

    layout("Available Formats", &body)
}

fn layout(heading: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n\
         <head><meta charset=\"utf-8\"><title>{PAGE_TITLE}</title></head>\n\
         <body>\n<h1>{}</h1>\n{}\n</body>\n</html>\n",
        escape_html(heading),
        body
    )
}

fn encode_query(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
