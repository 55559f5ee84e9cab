use std::borrow::Cow;

use url::Url;

/// Name used when neither the response nor the url yields one. Some hosts also
/// send it as a generic `content-disposition` value, so it never wins there.
pub const PLACEHOLDER_FILENAME: &str = "mod_download.zip";

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Pick a file name for a downloaded body.
///
/// Order: `filename=` from the content-disposition header (unless it is the
/// placeholder), then the last path segment of the final url (after
/// redirects) or the request url, then [`PLACEHOLDER_FILENAME`].
pub fn resolve_filename(
    content_disposition: Option<&str>,
    request_url: &str,
    final_url: Option<&str>,
) -> String {
    if let Some(name) = content_disposition.and_then(header_filename) {
        if name != PLACEHOLDER_FILENAME {
            if let Some(name) = usable(&name) {
                return name;
            }
        }
    }

    let url = final_url.unwrap_or(request_url);
    url_filename(url)
        .and_then(|name| usable(&name))
        .unwrap_or_else(|| PLACEHOLDER_FILENAME.to_string())
}

fn header_filename(header: &str) -> Option<String> {
    let start = header.to_ascii_lowercase().find("filename=")? + "filename=".len();
    let raw = header[start..].split(';').next().unwrap_or_default();
    let raw = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if raw.is_empty() {
        return None;
    }
    Some(percent_decode(raw).into_owned())
}

/// Last path segment as it appears in the url; unlike the header value it is
/// not percent-decoded.
fn url_filename(url: &str) -> Option<String> {
    match Url::parse(url) {
        Ok(parsed) => Some(parsed.path_segments()?.last()?.to_string()),
        Err(_) => {
            let path = url.split(|c| c == '?' || c == '#').next()?;
            Some(path.rsplit('/').next()?.to_string())
        }
    }
}

fn percent_decode(value: &str) -> Cow<'_, str> {
    urlencoding::decode(value).unwrap_or(Cow::Borrowed(value))
}

fn usable(name: &str) -> Option<String> {
    let name = sanitize_filename(name);
    let name = name.trim_matches(|c| c == '.' || c == ' ');
    (!name.is_empty()).then(|| name.to_string())
}
