use reqwest::Url;

const DEFAULT_EXTENSION: &str = ".flac";

/// Works out the name a downloaded file should be stored under.
///
/// `Content-Disposition` wins when present (RFC 5987 `filename*` before plain
/// `filename`); otherwise the last path segment of the URL is used. Names
/// without an extension get `.flac`, which is what Bandcamp serves when it
/// leaves the extension off.
pub fn resolve_filename(content_disposition: Option<&str>, url: &str) -> Option<String> {
    let name = match content_disposition {
        Some(header) => from_content_disposition(header)?,
        None => from_url(url)?,
    };

    if name.is_empty() {
        return None;
    }
    if name.contains('.') {
        Some(name)
    } else {
        Some(format!("{name}{DEFAULT_EXTENSION}"))
    }
}

fn from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    Some(urlencoding::decode(last).ok()?.into_owned())
}

fn from_content_disposition(header: &str) -> Option<String> {
    let params: Vec<(String, &str)> = header
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            Some((key.trim().to_ascii_lowercase(), value.trim()))
        })
        .collect();

    if let Some((_, value)) = params.iter().find(|(k, _)| k == "filename*") {
        let value = strip_quotes(value);
        let encoded = match value.find("''") {
            Some(pos) => &value[pos + 2..],
            None => value,
        };
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return Some(decoded.into_owned());
        }
    }

    params
        .iter()
        .find(|(k, _)| k == "filename")
        .map(|(_, v)| strip_quotes(v).to_string())
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_filename_header() {
        let name = resolve_filename(
            Some(r#"attachment; filename="Artist - Song.flac""#),
            "https://p4.bcbits.com/download/track/abc",
        );
        assert_eq!(name.as_deref(), Some("Artist - Song.flac"));
    }

    #[test]
    fn rfc5987_filename_is_decoded() {
        let name = resolve_filename(
            Some("attachment; filename=\"x.zip\"; filename*=UTF-8''Caf%C3%A9%20Tacvba.zip"),
            "https://example.com/d",
        );
        assert_eq!(name.as_deref(), Some("Café Tacvba.zip"));
    }

    #[test]
    fn missing_extension_gets_flac() {
        let name = resolve_filename(Some("attachment; filename=song"), "https://example.com/d");
        assert_eq!(name.as_deref(), Some("song.flac"));
    }

    #[test]
    fn falls_back_to_url_path() {
        assert_eq!(
            resolve_filename(None, "https://example.com/files/album.zip?token=1").as_deref(),
            Some("album.zip")
        );
        assert_eq!(
            resolve_filename(None, "https://example.com/files/track42").as_deref(),
            Some("track42.flac")
        );
    }

    #[test]
    fn no_name_anywhere() {
        assert_eq!(resolve_filename(None, "https://example.com/"), None);
        assert_eq!(resolve_filename(None, "not a url"), None);
        assert_eq!(resolve_filename(Some("attachment"), "https://example.com/a.zip"), None);
    }
}
