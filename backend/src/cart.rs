//! Turns exported cart entries and release URLs into cart add requests.

use bclient::{BandcampApi, TralbumDetails, minimum_price};
use tracing::debug;

use crate::error::ItemError;
use crate::protocol::{CartAddRequest, CartImportItem};

/// Looks up an exported entry and prices it.
pub async fn resolve_item(
    api: &dyn BandcampApi,
    entry: &CartImportItem,
) -> Result<CartAddRequest, ItemError> {
    let details = api.tralbum_details(entry.item_id, entry.item_type).await?;
    to_cart_add(entry, &details)
}

/// Reads the item identity off a release page, then prices it like an
/// exported entry.
pub async fn resolve_url(api: &dyn BandcampApi, url: &str) -> Result<CartAddRequest, ItemError> {
    let props = api.page_properties(url).await?;
    let details = api.tralbum_details(props.item_id, props.item_type).await?;

    let entry = CartImportItem {
        item_id: props.item_id,
        item_type: props.item_type,
        item_title: details.title.clone(),
        band_name: details.tralbum_artist.clone(),
        currency: details.currency.clone(),
        url: if details.bandcamp_url.is_empty() {
            url.to_string()
        } else {
            details.bandcamp_url.clone()
        },
        unit_price: None,
    };
    to_cart_add(&entry, &details)
}

pub fn to_cart_add(
    entry: &CartImportItem,
    details: &TralbumDetails,
) -> Result<CartAddRequest, ItemError> {
    if !details.is_purchasable {
        let title = if entry.item_title.is_empty() {
            &details.title
        } else {
            &entry.item_title
        };
        return Err(ItemError::NotPurchasable(title.clone()));
    }

    let currency = if entry.currency.is_empty() {
        details.currency.clone()
    } else {
        entry.currency.clone()
    };
    let unit_price = choose_price(entry.unit_price, details.price, &currency)?;

    debug!(item_id = entry.item_id, unit_price, %currency, "cart item priced");

    Ok(CartAddRequest {
        item_id: entry.item_id,
        item_type: entry.item_type.code().to_string(),
        item_title: entry.item_title.clone(),
        band_name: entry.band_name.clone(),
        unit_price,
        currency,
        url: entry.url.clone(),
    })
}

/// Exported price first, then the live price, then the currency minimum for
/// name-your-price items.
pub fn choose_price(
    exported: Option<f64>,
    fetched: f64,
    currency: &str,
) -> Result<f64, ItemError> {
    if let Some(price) = exported {
        return Ok(price);
    }
    if fetched > 0.0 {
        return Ok(fetched);
    }
    minimum_price(currency).ok_or_else(|| ItemError::UnknownCurrency(currency.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bclient::ItemType;

    fn entry(unit_price: Option<f64>, currency: &str) -> CartImportItem {
        CartImportItem {
            item_id: 11,
            item_type: ItemType::Track,
            item_title: "Song".into(),
            band_name: "Band".into(),
            currency: currency.into(),
            url: "https://band.bandcamp.com/track/song".into(),
            unit_price,
        }
    }

    fn details(price: f64, purchasable: bool) -> TralbumDetails {
        TralbumDetails {
            id: 11,
            item_type: ItemType::Track,
            title: "Song".into(),
            tralbum_artist: "Band".into(),
            price,
            currency: "USD".into(),
            is_purchasable: purchasable,
            bandcamp_url: "https://band.bandcamp.com/track/song".into(),
        }
    }

    #[test]
    fn exported_price_wins() {
        let req = to_cart_add(&entry(Some(3.0), "USD"), &details(7.0, true)).unwrap();
        assert_eq!(req.unit_price, 3.0);
        assert_eq!(req.item_type, "t");
        assert_eq!(req.band_name, "Band");
    }

    #[test]
    fn live_price_used_when_nothing_exported() {
        let req = to_cart_add(&entry(None, "USD"), &details(7.0, true)).unwrap();
        assert_eq!(req.unit_price, 7.0);
    }

    #[test]
    fn free_items_fall_back_to_currency_minimum() {
        let req = to_cart_add(&entry(None, "GBP"), &details(0.0, true)).unwrap();
        assert_eq!(req.unit_price, 0.25);
        assert_eq!(req.currency, "GBP");
    }

    #[test]
    fn unknown_currency_is_an_item_failure() {
        let err = to_cart_add(&entry(None, "XXX"), &details(0.0, true)).unwrap_err();
        assert!(matches!(err, ItemError::UnknownCurrency(c) if c == "XXX"));
    }

    #[test]
    fn not_purchasable_names_the_title() {
        let err = to_cart_add(&entry(None, "USD"), &details(1.0, false)).unwrap_err();
        assert_eq!(err.to_string(), "Item \"Song\" is not purchasable");
    }
}
