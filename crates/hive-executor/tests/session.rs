//! Controller sessions driving an in-process executor.

mod common;

use futures_util::future::join_all;
use hive_executor::{EngineError, MemoryEngine};
use hive_types::{Cookie, EntityId, HiveError};
use serde_json::json;

use common::{connect, Recorder};

#[tokio::test]
async fn open_fires_events_and_resolves_with_status() {
    let c = connect(MemoryEngine::default());
    let page = c.session.create_page().await.unwrap();
    assert_eq!(page.id(), EntityId(1));

    let loads = Recorder::default();
    page.on("onLoadFinished", loads.listener());
    let urls = Recorder::default();
    page.on("urlChanged", urls.listener());

    let status = page.open("https://example.com/path").await.unwrap();
    assert_eq!(status, "success");
    assert_eq!(loads.calls(), vec![vec![json!("success")]]);
    assert_eq!(urls.calls(), vec![vec![json!("https://example.com/path")]]);

    let title = page
        .evaluate("function () { return document.title; }", vec![])
        .await
        .unwrap();
    assert_eq!(title, json!("example.com"));
}

#[tokio::test]
async fn concurrent_page_creation_yields_distinct_ids() {
    let c = connect(MemoryEngine::default());
    let creating = (0..8).map(|_| c.session.create_page());
    let mut ids: Vec<EntityId> = join_all(creating)
        .await
        .into_iter()
        .map(|page| page.unwrap().id())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(c.session.pages().len(), 8);
}

#[tokio::test]
async fn failed_navigation_still_answers() {
    let c = connect(MemoryEngine::default());
    let page = c.session.create_page().await.unwrap();
    assert_eq!(page.open("ftp://nowhere").await.unwrap(), "fail");
    assert_eq!(page.get("url").await.unwrap(), json!("about:blank"));
}

#[tokio::test]
async fn evaluate_passes_arguments_and_reports_console_output() {
    let c = connect(MemoryEngine::default());
    let page = c.session.create_page().await.unwrap();
    let console = Recorder::default();
    page.on("consoleMessage", console.listener());

    let value = page
        .evaluate(
            "function (a, b) { console.log(\"checking\"); return a; }",
            vec![json!({"k": [1, 2]}), json!(2)],
        )
        .await
        .unwrap();
    assert_eq!(value, json!({"k": [1, 2]}));
    assert_eq!(console.calls()[0][0], json!("checking"));
}

#[tokio::test]
async fn custom_evaluator_is_used() {
    let engine = MemoryEngine::default().with_evaluator(|source, args, page| {
        if source.contains("boom") {
            return Err(EngineError::Script("boom".into()));
        }
        Ok(json!({"url": page.url, "argc": args.len()}))
    });
    let c = connect(engine);
    let page = c.session.create_page().await.unwrap();

    let value = page.evaluate("anything", vec![json!(1), json!(2)]).await.unwrap();
    assert_eq!(value, json!({"url": "about:blank", "argc": 2}));

    let err = page.evaluate("boom", vec![]).await.unwrap_err();
    match err {
        HiveError::Remote { command, message } => {
            assert_eq!(command, "evaluate");
            assert!(message.contains("boom"));
        }
        other => panic!("expected a remote failure, got {other:?}"),
    }
}

#[tokio::test]
async fn settings_are_merged_and_read_only_properties_fail() {
    let c = connect(MemoryEngine::default());
    let page = c.session.create_page().await.unwrap();

    page.set("settings", json!({"userAgent": "hive-test"}))
        .await
        .unwrap();
    let settings = page.get("settings").await.unwrap();
    assert_eq!(settings["userAgent"], json!("hive-test"));
    assert_eq!(settings["javascriptEnabled"], json!(true));

    let values = page.get_many(&["zoomFactor", "url"]).await.unwrap();
    assert_eq!(values["zoomFactor"], json!(1));
    assert_eq!(values["url"], json!("about:blank"));

    assert!(matches!(
        page.set("title", json!("nope")).await,
        Err(HiveError::Remote { .. })
    ));
}

#[tokio::test]
async fn session_cookie_batches_answer_per_element() {
    let c = connect(MemoryEngine::default());
    let added = c
        .session
        .add_cookies(&[Cookie::new("a", "1"), Cookie::new("b", "2").domain("example.com")])
        .await
        .unwrap();
    assert_eq!(added, vec![true, true]);

    let cookies = c.session.get("cookies").await.unwrap();
    assert_eq!(cookies.as_array().map(Vec::len), Some(2));

    let deleted = c.session.delete_cookies(&["a", "missing"]).await.unwrap();
    assert_eq!(deleted, vec![true, false]);

    c.session.clear_cookies().await.unwrap();
    assert_eq!(c.session.get("cookies").await.unwrap(), json!([]));
}

#[tokio::test]
async fn page_cookies_are_separate_from_the_session_jar() {
    let c = connect(MemoryEngine::default());
    let page = c.session.create_page().await.unwrap();
    assert!(page.add_cookie(&Cookie::new("p", "1")).await.unwrap());
    assert_eq!(c.session.get("cookies").await.unwrap(), json!([]));
    assert!(page.delete_cookie("p").await.unwrap());
    assert!(!page.delete_cookie("p").await.unwrap());
}

#[tokio::test]
async fn render_base64_and_input_events() {
    let c = connect(MemoryEngine::default());
    let page = c.session.create_page().await.unwrap();
    let data = page.render_base64("png").await.unwrap();
    assert!(data.starts_with("iVBORw0KGgo"));

    page.send_event("click", vec![json!(5), json!(5)]).await.unwrap();
    assert!(page.send_event("wiggle", vec![]).await.is_err());
}

#[tokio::test]
async fn inject_js_resolves_against_library_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("helpers.js"), "function () { return 1; }").unwrap();
    let c = connect(MemoryEngine::new(dir.path().to_path_buf()));

    assert!(c.session.inject_js("helpers.js").await.unwrap());
    assert!(!c.session.inject_js("absent.js").await.unwrap());

    let page = c.session.create_page().await.unwrap();
    page.set("libraryPath", json!(dir.path().display().to_string()))
        .await
        .unwrap();
    assert!(page.inject_js("helpers.js").await.unwrap());
}

#[tokio::test]
async fn plain_script_files_inject_at_both_levels() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("plain.js"), "var x = 1;").unwrap();
    let c = connect(MemoryEngine::new(dir.path().to_path_buf()));

    assert!(c.session.inject_js("plain.js").await.unwrap());
    let page = c.session.create_page().await.unwrap();
    assert!(page.inject_js("plain.js").await.unwrap());
    assert!(!page.inject_js("absent.js").await.unwrap());
}

#[tokio::test]
async fn closed_page_rejects_further_calls() {
    let c = connect(MemoryEngine::default());
    let page = c.session.create_page().await.unwrap();
    let id = page.id();
    page.close().await.unwrap();

    assert!(c.session.page(id).is_none());
    assert!(matches!(page.get("url").await, Err(HiveError::EntityClosed(closed)) if closed == id));

    let next = c.session.create_page().await.unwrap();
    assert_eq!(next.id(), EntityId(2));
}

#[tokio::test]
async fn exit_handshake_stops_the_executor() {
    let c = connect(MemoryEngine::default());
    let page = c.session.create_page().await.unwrap();
    let closing = Recorder::default();
    page.on("closing", closing.listener());

    c.session.exit().await.unwrap();
    c.executor.await.unwrap().unwrap();

    assert_eq!(closing.calls().len(), 1);
    assert!(!c.session.is_alive());
    assert!(page.is_closed());
    assert!(matches!(
        c.session.create_page().await,
        Err(HiveError::SessionClosed(_))
    ));
}
