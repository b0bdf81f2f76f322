use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::api::{BandcampApi, FileSource};
use crate::errors::BandcampError;
use crate::filename::resolve_filename;
use crate::page::parse_page_properties;
use crate::types::{
    CollectionPage, CollectionSummary, CollectionSummaryEnvelope, DownloadedFile, HideAction,
    HideUnhideOutcome, HideUnhideResponse, ItemType, PageProperties, TralbumDetails,
};

const MOBILE_USER_AGENT: &str = "Bandcamp/218977 CFNetwork/1399 Darwin/22.1.0";

/// The mobile endpoint ignores `band_id` but refuses requests without one.
const PLACEHOLDER_BAND_ID: u64 = 12345;

#[derive(Clone)]
pub struct BandcampClient {
    http: Client,
    base_url: String,
    /// Sent only on requests to `base_url`, never on page scrapes or file
    /// downloads, which may point at any host.
    identity: Option<HeaderValue>,
}

#[derive(Serialize)]
struct CollectionPageRequest<'a> {
    fan_id: u64,
    older_than_token: &'a str,
    count: usize,
}

#[derive(Serialize)]
struct HideUnhideForm<'a> {
    fan_id: u64,
    item_type: &'a str,
    item_id: u64,
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    crumb: Option<&'a str>,
}

#[derive(Serialize)]
struct TralbumDetailsRequest {
    tralbum_type: &'static str,
    band_id: u64,
    tralbum_id: u64,
}

impl BandcampClient {
    /// `identity` is the value of the fan's `identity` cookie; without it the
    /// collection endpoints answer as a logged-out visitor.
    pub fn new(
        base_url: String,
        timeout: Duration,
        identity: Option<&str>,
    ) -> Result<Self, BandcampError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));

        let identity = identity
            .map(|identity| {
                let mut cookie = HeaderValue::from_str(&format!("identity={identity}")).map_err(
                    |e| BandcampError::InvalidResponse(format!("bad identity cookie: {e}")),
                )?;
                cookie.set_sensitive(true);
                Ok::<_, BandcampError>(cookie)
            })
            .transpose()?;

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    /// Request against the Bandcamp API, carrying the fan's cookie.
    fn api(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.identity {
            Some(cookie) => req.header(header::COOKIE, cookie.clone()),
            None => req,
        }
    }

    async fn fetch_page(
        &self,
        path: &str,
        fan_id: u64,
        older_than_token: &str,
        count: usize,
    ) -> Result<CollectionPage, BandcampError> {
        let body = CollectionPageRequest {
            fan_id,
            older_than_token,
            count,
        };

        let resp = self
            .api(Method::POST, path)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let page: CollectionPage = decode(resp).await?;

        debug!(
            items = page.items.len(),
            more_available = ?page.more_available,
            last_token = ?page.last_token,
            "collection page fetched"
        );

        Ok(page)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, BandcampError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| BandcampError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl BandcampApi for BandcampClient {
    #[instrument(skip(self), level = "debug")]
    async fn collection_summary(&self) -> Result<CollectionSummary, BandcampError> {
        let resp = self
            .api(Method::GET, "/api/fan/2/collection_summary")
            .send()
            .await?
            .error_for_status()?;

        let envelope: CollectionSummaryEnvelope = decode(resp).await?;

        debug!(fan_id = envelope.collection_summary.fan_id, "collection summary fetched");

        Ok(envelope.collection_summary)
    }

    #[instrument(skip(self), level = "debug")]
    async fn collection_items(
        &self,
        fan_id: u64,
        older_than_token: &str,
        count: usize,
    ) -> Result<CollectionPage, BandcampError> {
        self.fetch_page(
            "/api/fancollection/1/collection_items",
            fan_id,
            older_than_token,
            count,
        )
        .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn hidden_items(
        &self,
        fan_id: u64,
        older_than_token: &str,
        count: usize,
    ) -> Result<CollectionPage, BandcampError> {
        self.fetch_page(
            "/api/fancollection/1/hidden_items",
            fan_id,
            older_than_token,
            count,
        )
        .await
    }

    #[instrument(skip(self, crumb), fields(has_crumb = crumb.is_some()), level = "debug")]
    async fn hide_unhide_once(
        &self,
        action: HideAction,
        fan_id: u64,
        item_type: ItemType,
        item_id: u64,
        crumb: Option<&str>,
    ) -> Result<HideUnhideOutcome, BandcampError> {
        let form = HideUnhideForm {
            fan_id,
            item_type: item_type.as_str(),
            item_id,
            action: action.as_str(),
            crumb,
        };

        let resp = self
            .api(Method::POST, "/api/collectionowner/1/hide_unhide_item")
            .form(&form)
            .send()
            .await?;

        // Crumb failures arrive with an error status but a JSON body we need.
        let status = resp.status();
        let body: HideUnhideResponse = match decode(resp).await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(BandcampError::InvalidResponse(format!(
                    "hide_unhide_item returned {status}"
                )));
            }
            Err(e) => return Err(e),
        };

        Ok(body.into())
    }

    #[instrument(skip(self), level = "debug")]
    async fn tralbum_details(
        &self,
        item_id: u64,
        item_type: ItemType,
    ) -> Result<TralbumDetails, BandcampError> {
        let body = TralbumDetailsRequest {
            tralbum_type: item_type.code(),
            band_id: PLACEHOLDER_BAND_ID,
            tralbum_id: item_id,
        };

        let resp = self
            .api(Method::POST, "/api/mobile/25/tralbum_details")
            .header(header::USER_AGENT, MOBILE_USER_AGENT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let details: TralbumDetails = decode(resp).await?;

        debug!(
            price = details.price,
            currency = %details.currency,
            purchasable = details.is_purchasable,
            "tralbum details fetched"
        );

        Ok(details)
    }

    #[instrument(skip(self), level = "debug")]
    async fn page_properties(&self, url: &str) -> Result<PageProperties, BandcampError> {
        let html = self
            .http
            .get(url)
            .header(header::ACCEPT, "text/html")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_page_properties(&html)
    }
}

#[async_trait]
impl FileSource for BandcampClient {
    #[instrument(skip(self), level = "debug")]
    async fn fetch_file(&self, url: &str) -> Result<DownloadedFile, BandcampError> {
        let resp = self.http.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BandcampError::Download(format!("{url} returned {status}")));
        }

        let disposition = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let name = resolve_filename(disposition.as_deref(), url)
            .ok_or_else(|| BandcampError::Download(format!("unable to determine filename for {url}")))?;

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(BandcampError::Download(format!("{name} has 0 bytes")));
        }

        debug!(%name, size = bytes.len(), "file downloaded");

        Ok(DownloadedFile {
            name,
            bytes: bytes.to_vec(),
        })
    }
}
