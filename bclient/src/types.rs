use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Track or album ("tralbum").
///
/// Collection endpoints spell these out in full, the mobile API uses the
/// single-letter codes. Both are accepted when deserializing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    #[serde(rename = "track", alias = "t")]
    Track,
    #[serde(rename = "album", alias = "a")]
    Album,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Track => "track",
            ItemType::Album => "album",
        }
    }

    /// Single-letter code used by the mobile API and the cart endpoint.
    pub fn code(self) -> &'static str {
        match self {
            ItemType::Track => "t",
            ItemType::Album => "a",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HideAction {
    Hide,
    Unhide,
}

impl HideAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HideAction::Hide => "hide",
            HideAction::Unhide => "unhide",
        }
    }
}

impl fmt::Display for HideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectionSummaryEnvelope {
    pub collection_summary: CollectionSummary,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CollectionSummary {
    pub fan_id: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tralbum_lookup: HashMap<String, TralbumLookupEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TralbumLookupEntry {
    pub item_type: ItemType,
    pub item_id: u64,
    #[serde(default)]
    pub band_id: Option<u64>,
    #[serde(default)]
    pub purchased: Option<String>,
}

/// One entry of the fan collection listing (visible or hidden).
#[derive(Clone, Debug, Deserialize)]
pub struct CollectionItem {
    pub item_id: u64,
    pub item_type: ItemType,
    /// `null` or `0` when the item is visible.
    #[serde(default)]
    pub hidden: Option<u32>,
    #[serde(default)]
    pub item_title: Option<String>,
    #[serde(default)]
    pub band_name: Option<String>,
}

impl CollectionItem {
    pub fn is_hidden(&self) -> bool {
        matches!(self.hidden, Some(flag) if flag != 0)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CollectionPage {
    #[serde(default)]
    pub items: Vec<CollectionItem>,
    #[serde(default)]
    pub more_available: Option<bool>,
    #[serde(default)]
    pub last_token: Option<String>,
}

/// Raw body of `hide_unhide_item`.
///
/// The endpoint reports success as `{"ok": true}`; a stale crumb comes back
/// as `{"error": "invalid_crumb", "crumb": "<fresh>"}`.
#[derive(Debug, Default, Deserialize)]
pub struct HideUnhideResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub crumb: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HideUnhideOutcome {
    Ok,
    InvalidCrumb { fresh: Option<String> },
    Rejected { error: String },
}

impl From<HideUnhideResponse> for HideUnhideOutcome {
    fn from(resp: HideUnhideResponse) -> Self {
        match resp.error {
            Some(serde_json::Value::String(code)) if code == "invalid_crumb" => {
                HideUnhideOutcome::InvalidCrumb { fresh: resp.crumb }
            }
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false))
                if resp.ok == Some(true) =>
            {
                HideUnhideOutcome::Ok
            }
            other => {
                let error = resp
                    .error_message
                    .or_else(|| other.and_then(|v| v.as_str().map(str::to_owned)))
                    .unwrap_or_else(|| "unknown error".to_string());
                HideUnhideOutcome::Rejected { error }
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TralbumDetails {
    pub id: u64,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tralbum_artist: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub is_purchasable: bool,
    #[serde(default)]
    pub bandcamp_url: String,
}

/// Item identity scraped from a release page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct PageProperties {
    pub item_id: u64,
    pub item_type: ItemType,
}

#[derive(Clone, Debug)]
pub struct DownloadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_accepts_both_spellings() {
        let full: ItemType = serde_json::from_str("\"album\"").unwrap();
        let code: ItemType = serde_json::from_str("\"t\"").unwrap();
        assert_eq!(full, ItemType::Album);
        assert_eq!(code, ItemType::Track);
        assert_eq!(serde_json::to_string(&ItemType::Track).unwrap(), "\"track\"");
    }

    #[test]
    fn hidden_flag_null_or_zero_is_visible() {
        let page: CollectionPage = serde_json::from_str(
            r#"{"items":[
                {"item_id":1,"item_type":"album","hidden":null},
                {"item_id":2,"item_type":"track","hidden":1},
                {"item_id":3,"item_type":"track","hidden":0},
                {"item_id":4,"item_type":"album"}
            ],"more_available":false,"last_token":"x"}"#,
        )
        .unwrap();

        let hidden: Vec<u64> = page
            .items
            .iter()
            .filter(|i| i.is_hidden())
            .map(|i| i.item_id)
            .collect();
        assert_eq!(hidden, vec![2]);
    }

    #[test]
    fn hide_unhide_response_classification() {
        let ok: HideUnhideResponse = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert_eq!(HideUnhideOutcome::from(ok), HideUnhideOutcome::Ok);

        let stale: HideUnhideResponse =
            serde_json::from_str(r#"{"error":"invalid_crumb","crumb":"fresh-1"}"#).unwrap();
        assert_eq!(
            HideUnhideOutcome::from(stale),
            HideUnhideOutcome::InvalidCrumb {
                fresh: Some("fresh-1".into())
            }
        );

        let other: HideUnhideResponse =
            serde_json::from_str(r#"{"error":true,"error_message":"not yours"}"#).unwrap();
        assert_eq!(
            HideUnhideOutcome::from(other),
            HideUnhideOutcome::Rejected {
                error: "not yours".into()
            }
        );
    }
}
