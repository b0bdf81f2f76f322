//! Scraping of release pages.
//!
//! Every album and track page carries a
//! `<meta name="bc-page-properties" content="{...}">` tag whose JSON payload
//! names the item. That is all the URL import needs; price and currency come
//! from the mobile API afterwards.

use crate::errors::BandcampError;
use crate::types::PageProperties;

const META_MARKER: &str = "name=\"bc-page-properties\"";

pub fn parse_page_properties(html: &str) -> Result<PageProperties, BandcampError> {
    let tag_start = html
        .find(META_MARKER)
        .and_then(|pos| html[..pos].rfind('<'))
        .ok_or_else(|| BandcampError::PageParse("bc-page-properties meta tag not found".into()))?;

    let tag_end = html[tag_start..]
        .find('>')
        .map(|off| tag_start + off)
        .ok_or_else(|| BandcampError::PageParse("unterminated meta tag".into()))?;

    let tag = &html[tag_start..tag_end];
    let content = attribute(tag, "content")
        .ok_or_else(|| BandcampError::PageParse("meta tag has no content".into()))?;

    let json = unescape_html(content);
    serde_json::from_str::<PageProperties>(&json)
        .map_err(|e| BandcampError::PageParse(format!("not a track or album page: {e}")))
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}

fn unescape_html(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
