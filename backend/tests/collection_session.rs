mod mock_api;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::timeout;

use backend::{
    config::AppConfig,
    port::{PortHandle, port_pair},
    protocol::COLLECTION_PORT,
    router::{PortKind, PortRouter, Services},
};

use mock_api::{MockBandcamp, details, item, page};

// -----------------------
// helpers
// -----------------------

fn test_config() -> AppConfig {
    AppConfig {
        api_min_interval_ms: 100,
        cart_add_delay_ms: 0,
        ..AppConfig::default()
    }
}

async fn connect(api: Arc<MockBandcamp>) -> PortHandle {
    let router = PortRouter::new(Services::new(api.clone(), api, test_config()));
    let (port, handle) = port_pair(COLLECTION_PORT, 64);
    assert_eq!(router.accept(port).await, Some(PortKind::Collection));
    handle
}

async fn send(handle: &PortHandle, msg: Value) {
    handle.tx.send(msg).await.expect("session alive");
}

/// Next message carrying `key`, skipping everything else.
async fn next_with(handle: &mut PortHandle, key: &str) -> Value {
    timeout(Duration::from_secs(600), async {
        loop {
            let msg = handle.rx.recv().await.expect("port open");
            if let Some(v) = msg.get(key) {
                return v.clone();
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {key} message"))
}

// -----------------------
// tests
// -----------------------

#[tokio::test(start_paused = true)]
async fn hide_walks_every_page_and_hides_visible_items() {
    let api = Arc::new(MockBandcamp::new(77).with_visible_pages(vec![
        page(vec![item(1, None), item(2, Some(1)), item(3, Some(0))], true, "t1"),
        page(vec![item(4, None)], false, "t2"),
    ]));
    let mut handle = connect(api.clone()).await;

    send(&handle, json!({ "hide": { "crumb": "c0" } })).await;

    let done = next_with(&mut handle, "hideComplete").await;
    assert_eq!(done["message"], json!("Successfully hidden 3 items"));
    assert_eq!(api.applied_ids(), vec![1, 3, 4]);

    let tokens = api.tokens_seen.lock().clone();
    assert_eq!(tokens.len(), 2, "stops once more_available is false");
    assert!(tokens[0].ends_with(":999999999:t::"), "{}", tokens[0]);
    assert_eq!(tokens[1], "t1");

    send(&handle, json!({ "getUnhideState": true })).await;
    let state = next_with(&mut handle, "hideState").await;
    assert_eq!(state["isProcessing"], json!(false));
    assert_eq!(state["processedCount"], json!(3));
    assert_eq!(state["operation"], json!("hide"));
}

#[tokio::test(start_paused = true)]
async fn unhide_with_nothing_hidden_reports_no_items() {
    let api = Arc::new(MockBandcamp::new(5));
    let mut handle = connect(api.clone()).await;

    send(&handle, json!({ "unhide": { "crumb": null } })).await;

    let done = next_with(&mut handle, "unhideComplete").await;
    assert_eq!(done["message"], json!("No hidden items found"));
    assert_eq!(api.hide_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn second_batch_is_rejected_while_one_runs() {
    let mut api = MockBandcamp::new(5).with_hidden_pages(vec![page(
        vec![item(1, Some(1)), item(2, Some(1))],
        false,
        "t1",
    )]);
    api.hide_delay = Some(Duration::from_secs(3));
    let api = Arc::new(api);
    let mut handle = connect(api.clone()).await;

    send(&handle, json!({ "unhide": {} })).await;
    // Wait until the batch is actually under way.
    let first = next_with(&mut handle, "unhideState").await;
    assert_eq!(first["isProcessing"], json!(true));

    send(&handle, json!({ "cartUrlImport": { "urls": ["https://x.bandcamp.com/album/y"] } })).await;
    let rejected = next_with(&mut handle, "cartImportError").await;
    assert_eq!(rejected["message"], json!("A batch operation is already in progress"));

    let done = next_with(&mut handle, "unhideComplete").await;
    assert_eq!(done["message"], json!("Successfully unhidden 2 items"));
}

#[tokio::test(start_paused = true)]
async fn listing_failure_is_a_single_terminal_error() {
    let mut api = MockBandcamp::new(5);
    api.summary_fails = true;
    let mut handle = connect(Arc::new(api)).await;

    send(&handle, json!({ "unhide": { "crumb": "c" } })).await;

    let msg = timeout(Duration::from_secs(60), handle.rx.recv())
        .await
        .expect("reply")
        .expect("port open");
    let text = msg["unhideError"]["message"].as_str().expect("unhideError first");
    assert!(text.starts_with("Failed to get collection summary: "), "{text}");
}

#[tokio::test(start_paused = true)]
async fn listing_errors_name_the_listing_that_failed() {
    for (request, reply, expected) in [
        ("unhide", "unhideError", "Failed to fetch hidden items: "),
        ("hide", "hideError", "Failed to fetch collection items: "),
    ] {
        let mut api = MockBandcamp::new(5);
        api.listing_fails = true;
        let mut handle = connect(Arc::new(api)).await;

        send(&handle, json!({ request: { "crumb": "c" } })).await;

        let err = next_with(&mut handle, reply).await;
        let text = err["message"].as_str().expect("error message");
        assert!(text.starts_with(expected), "{text}");
    }
}

#[tokio::test(start_paused = true)]
async fn cart_state_is_idle_after_a_hide_batch() {
    let api = Arc::new(MockBandcamp::new(3).with_visible_pages(vec![page(
        vec![item(1, None)],
        false,
        "t1",
    )]));
    let mut handle = connect(api).await;

    send(&handle, json!({ "hide": { "crumb": "c" } })).await;
    next_with(&mut handle, "hideComplete").await;

    send(&handle, json!({ "getCartImportState": true })).await;
    let state = next_with(&mut handle, "cartImportState").await;
    assert_eq!(state["operation"], json!("cart_import"));
    assert_eq!(state["isProcessing"], json!(false));
    assert_eq!(state["processedCount"], json!(0));

    send(&handle, json!({ "getUnhideState": true })).await;
    let state = next_with(&mut handle, "hideState").await;
    assert_eq!(state["processedCount"], json!(1));
}

#[tokio::test(start_paused = true)]
async fn url_import_sends_cart_requests_from_page_details() {
    let url = "https://band.bandcamp.com/album/9";
    let mut api = MockBandcamp::new(5);
    api.pages.insert(
        url.to_string(),
        bclient::PageProperties {
            item_id: 9,
            item_type: bclient::ItemType::Album,
        },
    );
    api.details.insert(9, details(9, 4.5, "EUR"));
    let mut handle = connect(Arc::new(api)).await;

    send(&handle, json!({ "cartUrlImport": { "urls": [url, "https://nowhere.example/"] } })).await;

    let add = next_with(&mut handle, "cartAddRequest").await;
    assert_eq!(
        add,
        json!({
            "item_id": 9,
            "item_type": "a",
            "item_title": "Album 9",
            "band_name": "Band",
            "unit_price": 4.5,
            "currency": "EUR",
            "url": url
        })
    );

    let failed = next_with(&mut handle, "cartItemError").await;
    assert!(failed["message"]
        .as_str()
        .unwrap()
        .starts_with("Error processing URL https://nowhere.example/"));

    let done = next_with(&mut handle, "cartImportComplete").await;
    assert_eq!(
        done["message"],
        json!("Successfully added 1 items to cart. 1 items could not be added")
    );

    send(&handle, json!({ "getCartImportState": true })).await;
    let state = next_with(&mut handle, "cartImportState").await;
    assert_eq!(state["operation"], json!("url_import"));
    assert_eq!(state["processedCount"], json!(2));
}

#[tokio::test(start_paused = true)]
async fn malformed_messages_do_not_end_the_session() {
    let api = Arc::new(MockBandcamp::new(5));
    let mut handle = connect(api).await;

    send(&handle, json!({ "explode": true })).await;
    send(&handle, json!("not even an object")).await;
    send(&handle, json!({ "getCartImportState": true })).await;

    let state = next_with(&mut handle, "cartImportState").await;
    assert_eq!(state["isProcessing"], json!(false));
}
