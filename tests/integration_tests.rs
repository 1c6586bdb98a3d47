use spoiler_shield::config::HubConfig;
use spoiler_shield::dom::{Document, EventKind, HandlerId, MouseButton, NodeId};
use spoiler_shield::engine::Configuration;
use spoiler_shield::hub::{HubHandle, LocalTabs, SyncHub};
use spoiler_shield::page::{PageController, PageHandle, RevealState, WatcherState, MARKER_CLASS};
use spoiler_shield::protocol::{PageMessage, TabId};
use spoiler_shield::store::MemoryStore;
use std::sync::Arc;
use url::Url;

fn start_hub(config: Configuration) -> (HubHandle, LocalTabs) {
    let tabs = LocalTabs::new();
    let hub = SyncHub::spawn(
        Arc::new(MemoryStore::with_state(config)),
        Arc::new(tabs.clone()),
        HubConfig::default(),
    );
    (hub, tabs)
}

/// A page with a body holding the given tags, in order.
fn document(url: &str, tags: &[&str]) -> (Document, Vec<NodeId>) {
    let mut doc = Document::new(Url::parse(url).unwrap());
    let body = doc.create_body();
    let nodes = tags
        .iter()
        .map(|tag| {
            let node = doc.create_element(tag);
            doc.append_child(body, node).unwrap();
            node
        })
        .collect();
    (doc, nodes)
}

async fn open(hub: &HubHandle, tabs: &LocalTabs, id: u64, doc: Document) -> PageHandle {
    let page = PageController::spawn(TabId(id), doc, hub.clone());
    tabs.insert(page.clone());
    assert!(page.settle().await);
    page
}

fn blocking(blur: i64) -> Configuration {
    Configuration::new(true, ["example.com"], blur, false)
}

#[tokio::test]
async fn test_image_on_blocked_subdomain_suppressed() {
    let (hub, tabs) = start_hub(blocking(8));
    let (doc, nodes) = document("http://img.example.com/x.jpg", &["img"]);
    let page = open(&hub, &tabs, 1, doc).await;

    assert_eq!(page.reveal_state(nodes[0]).await, Some(RevealState::Suppressed));
    page.with_document(|doc| {
        assert_eq!(doc.style_filter(nodes[0]), Some("blur(8px)"));
        assert!(doc.has_class(nodes[0], MARKER_CLASS));
    });
    assert_eq!(page.watcher_state().await, Some(WatcherState::Observing));
}

#[tokio::test]
async fn test_video_follows_blur_videos_setting() {
    let (hub, tabs) = start_hub(blocking(8));
    let (doc, nodes) = document("http://img.example.com/", &["video", "img"]);
    let page = open(&hub, &tabs, 1, doc).await;

    assert_eq!(page.reveal_state(nodes[0]).await, None);
    assert_eq!(page.reveal_state(nodes[1]).await, Some(RevealState::Suppressed));
    page.with_document(|doc| assert_eq!(doc.style_filter(nodes[0]), None));

    page.deliver(PageMessage::StateUpdated(blocking(8).with_blur_videos(true)))
        .unwrap();
    page.settle().await;
    assert_eq!(page.reveal_state(nodes[0]).await, Some(RevealState::Suppressed));
}

#[tokio::test]
async fn test_inserted_nested_images_suppressed_without_rescan() {
    let (hub, tabs) = start_hub(blocking(6));
    let (doc, nodes) = document("https://www.example.com/feed", &["img"]);
    let page = open(&hub, &tabs, 1, doc).await;

    // Reveal the existing image; a full rescan would hide it again
    page.click(nodes[0], MouseButton::Primary).await.unwrap();
    assert_eq!(page.reveal_state(nodes[0]).await, Some(RevealState::Revealed));

    let (first, second) = page.with_document(|doc| {
        let body = doc.body().unwrap();
        let card = doc.create_element("article");
        let figure = doc.create_element("figure");
        let first = doc.create_element("img");
        let second = doc.create_element("img");
        doc.append_child(card, first).unwrap();
        doc.append_child(card, figure).unwrap();
        doc.append_child(figure, second).unwrap();
        doc.append_child(body, card).unwrap();
        assert_eq!(doc.flush_mutations(), 1);
        (first, second)
    });
    page.settle().await;

    assert_eq!(page.reveal_state(first).await, Some(RevealState::Suppressed));
    assert_eq!(page.reveal_state(second).await, Some(RevealState::Suppressed));
    assert_eq!(page.reveal_state(nodes[0]).await, Some(RevealState::Revealed));
}

#[tokio::test]
async fn test_disabled_never_suppresses() {
    let (hub, tabs) = start_hub(blocking(8).with_enabled(false).with_blur_videos(true));
    let (doc, nodes) = document("https://example.com/", &["img", "video"]);
    let page = open(&hub, &tabs, 1, doc).await;

    let late = page.with_document(|doc| {
        let img = doc.create_element("img");
        doc.append_child(doc.body().unwrap(), img).unwrap();
        doc.flush_mutations();
        img
    });
    page.settle().await;

    for node in [nodes[0], nodes[1], late] {
        assert_eq!(page.reveal_state(node).await, None);
    }
}

#[tokio::test]
async fn test_unmatched_host_untouched() {
    let (hub, tabs) = start_hub(blocking(8));
    let (doc, nodes) = document("https://notexample.com/", &["img"]);
    let page = open(&hub, &tabs, 1, doc).await;

    assert_eq!(page.reveal_state(nodes[0]).await, None);
}

#[tokio::test]
async fn test_click_toggle_law() {
    let (hub, tabs) = start_hub(blocking(8));
    let (mut doc, nodes) = document("https://example.com/", &["a"]);
    let img = doc.create_element("img");
    doc.append_child(nodes[0], img).unwrap();
    doc.add_listener(nodes[0], EventKind::Click, HandlerId("navigate"));
    let page = open(&hub, &tabs, 1, doc).await;

    let event = page.click(img, MouseButton::Primary).await.unwrap();
    assert!(event.default_prevented());
    assert!(event.propagation_stopped());
    assert!(event
        .delivered()
        .iter()
        .all(|(_, handler)| *handler != HandlerId("navigate")));
    assert_eq!(page.reveal_state(img).await, Some(RevealState::Revealed));

    page.click(img, MouseButton::Primary).await.unwrap();
    assert_eq!(page.reveal_state(img).await, Some(RevealState::Suppressed));

    // Clicks on undecorated content reach the page
    page.deliver(PageMessage::StateUpdated(blocking(8).with_enabled(false)))
        .unwrap();
    let event = page.click(img, MouseButton::Primary).await.unwrap();
    assert!(!event.default_prevented());
    assert!(event
        .delivered()
        .contains(&(nodes[0], HandlerId("navigate"))));
}

#[tokio::test]
async fn test_repeated_pass_is_idempotent() {
    let (hub, tabs) = start_hub(blocking(8));
    let (doc, nodes) = document("https://example.com/", &["img"]);
    let page = open(&hub, &tabs, 1, doc).await;

    let snapshot = |page: &PageHandle| {
        page.with_document(|doc| {
            (
                doc.style_filter(nodes[0]).map(str::to_string),
                doc.listener_count(nodes[0], EventKind::Click),
                doc.attribute(nodes[0], "data-spoiler-blurred").map(str::to_string),
            )
        })
    };
    let once = snapshot(&page);

    page.deliver(PageMessage::StateUpdated(blocking(8))).unwrap();
    page.deliver(PageMessage::StateUpdated(blocking(8))).unwrap();
    page.settle().await;

    assert_eq!(snapshot(&page), once);
    assert_eq!(once.1, 1);
}

#[tokio::test]
async fn test_configuration_change_resets_reveals() {
    let (hub, tabs) = start_hub(blocking(8));
    let (doc, nodes) = document("https://example.com/", &["img"]);
    let page = open(&hub, &tabs, 1, doc).await;

    page.click(nodes[0], MouseButton::Primary).await.unwrap();
    assert_eq!(page.reveal_state(nodes[0]).await, Some(RevealState::Revealed));

    hub.set_state(blocking(14)).await.unwrap();
    page.settle().await;

    assert_eq!(page.reveal_state(nodes[0]).await, Some(RevealState::Suppressed));
    page.with_document(|doc| assert_eq!(doc.style_filter(nodes[0]), Some("blur(14px)")));
}

#[tokio::test]
async fn test_deferred_body_observed_after_ready() {
    let (hub, tabs) = start_hub(blocking(8));
    let doc = Document::new(Url::parse("https://example.com/").unwrap());
    let page = open(&hub, &tabs, 1, doc).await;
    assert_eq!(page.watcher_state().await, Some(WatcherState::AwaitingBody));

    let early = page.with_document(|doc| {
        let body = doc.create_body();
        let img = doc.create_element("img");
        doc.append_child(body, img).unwrap();
        img
    });
    page.dom_ready().unwrap();
    page.settle().await;

    assert_eq!(page.watcher_state().await, Some(WatcherState::Observing));
    assert_eq!(page.reveal_state(early).await, Some(RevealState::Suppressed));

    let late = page.with_document(|doc| {
        let img = doc.create_element("img");
        doc.append_child(doc.body().unwrap(), img).unwrap();
        doc.flush_mutations();
        img
    });
    page.settle().await;
    assert_eq!(page.reveal_state(late).await, Some(RevealState::Suppressed));
}

#[tokio::test]
async fn test_detached_element_reinserted_clean_after_disable() {
    let (hub, tabs) = start_hub(blocking(8));
    let (doc, nodes) = document("https://example.com/", &["img"]);
    let page = open(&hub, &tabs, 1, doc).await;
    let img = nodes[0];
    assert_eq!(page.reveal_state(img).await, Some(RevealState::Suppressed));

    page.with_document(|doc| doc.remove(img).unwrap());
    page.deliver(PageMessage::StateUpdated(blocking(8).with_enabled(false)))
        .unwrap();
    page.settle().await;

    page.with_document(|doc| {
        doc.append_child(doc.body().unwrap(), img).unwrap();
        doc.flush_mutations();
    });
    page.settle().await;

    assert_eq!(page.reveal_state(img).await, None);
    page.with_document(|doc| {
        assert_eq!(doc.style_filter(img), None);
        assert!(!doc.has_class(img, MARKER_CLASS));
        assert_eq!(doc.attribute(img, "data-spoiler-blurred"), None);
        assert_eq!(doc.listener_count(img, EventKind::Click), 0);
    });

    // Enabling again decorates it exactly once
    page.deliver(PageMessage::StateUpdated(blocking(8))).unwrap();
    page.settle().await;
    assert_eq!(page.reveal_state(img).await, Some(RevealState::Suppressed));
    page.with_document(|doc| assert_eq!(doc.listener_count(img, EventKind::Click), 1));
}

#[tokio::test]
async fn test_moved_revealed_element_is_blurred_again() {
    let (hub, tabs) = start_hub(blocking(8));
    let (doc, nodes) = document("https://example.com/", &["section", "img"]);
    let page = open(&hub, &tabs, 1, doc).await;
    let (section, img) = (nodes[0], nodes[1]);

    page.click(img, MouseButton::Primary).await.unwrap();
    assert_eq!(page.reveal_state(img).await, Some(RevealState::Revealed));

    // A move is a fresh insertion
    page.with_document(|doc| {
        doc.remove(img).unwrap();
        doc.append_child(section, img).unwrap();
        assert_eq!(doc.flush_mutations(), 1);
    });
    page.settle().await;

    assert_eq!(page.reveal_state(img).await, Some(RevealState::Suppressed));
    page.with_document(|doc| {
        assert_eq!(doc.style_filter(img), Some("blur(8px)"));
        assert_eq!(doc.listener_count(img, EventKind::Click), 1);
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_insertion_during_bootstrap_not_lost() {
    let (hub, tabs) = start_hub(blocking(8));
    for id in 1..=20 {
        let (doc, _) = document("https://example.com/", &[]);
        let page = PageController::spawn(TabId(id), doc, hub.clone());
        tabs.insert(page.clone());

        // Lands before the pass, or after the observer is registered
        let img = page.with_document(|doc| {
            let img = doc.create_element("img");
            doc.append_child(doc.body().unwrap(), img).unwrap();
            doc.flush_mutations();
            img
        });
        page.settle().await;
        assert_eq!(page.reveal_state(img).await, Some(RevealState::Suppressed));
    }
}
