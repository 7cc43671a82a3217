use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use sonance::catalog::Store;
use sonance::http::{build_router, AppState};
use sonance::tags::TrackTags;
use tower::util::ServiceExt;

async fn test_state(document_root: &std::path::Path) -> AppState {
    let db_dir = tempfile::tempdir().unwrap();
    let store = Store::open(&db_dir.path().join("catalog.db")).await.unwrap();
    // keep the tempdir alive for the duration of the process by leaking it;
    // tests are short-lived and the OS reclaims the path on exit.
    std::mem::forget(db_dir);

    AppState {
        store: Arc::new(store),
        document_root: Arc::new(document_root.to_path_buf()),
    }
}

fn tags(artist: &str, album: &str, title: &str, track: u32, length: u32) -> TrackTags {
    TrackTags {
        artist: artist.to_string(),
        album: album.to_string(),
        title: title.to_string(),
        track_no: Some(track),
        duration_secs: Some(length),
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn status_route_replies_alive() {
    let doc_root = tempfile::tempdir().unwrap();
    let router = build_router(test_state(doc_root.path()).await);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/bctl/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"Alive");
}

#[tokio::test]
async fn empty_library_returns_empty_arrays() {
    let doc_root = tempfile::tempdir().unwrap();
    let router = build_router(test_state(doc_root.path()).await);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/bctl/artists")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/bctl/albums?artist=Nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn single_song_is_browsable_end_to_end() {
    let doc_root = tempfile::tempdir().unwrap();
    let state = test_state(doc_root.path()).await;

    let song_path = PathBuf::from("/music/A/B/01 T.flac");
    state
        .store
        .add_file(&song_path, &tags("A", "B", "T", 3, 240))
        .await
        .unwrap();
    let hash = Store::hash_path(&song_path);

    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/bctl/artists")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await, serde_json::json!(["A"]));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/bctl/albums?artist=A")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await, serde_json::json!(["B"]));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/bctl/songs?artist=A&album=B")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await,
        serde_json::json!([{"title": "T", "length": 240, "hash": hash}])
    );
}

#[tokio::test]
async fn songs_are_ordered_by_track_regardless_of_insertion_order() {
    let doc_root = tempfile::tempdir().unwrap();
    let state = test_state(doc_root.path()).await;

    state
        .store
        .add_file(&PathBuf::from("/music/A/B/02.flac"), &tags("A", "B", "Second", 2, 10))
        .await
        .unwrap();
    state
        .store
        .add_file(&PathBuf::from("/music/A/B/01.flac"), &tags("A", "B", "First", 1, 10))
        .await
        .unwrap();

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/bctl/songs?artist=A&album=B")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let value = body_json(response).await;
    let titles: Vec<&str> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["First", "Second"]);
}

#[tokio::test]
async fn missing_query_param_is_bad_request() {
    let doc_root = tempfile::tempdir().unwrap();
    let router = build_router(test_state(doc_root.path()).await);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/bctl/albums")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_get_method_is_rejected() {
    let doc_root = tempfile::tempdir().unwrap();
    let router = build_router(test_state(doc_root.path()).await);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/bctl/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn range_request_on_stream_returns_partial_content() {
    let doc_root = tempfile::tempdir().unwrap();
    let songs_dir = tempfile::tempdir().unwrap();
    let song_path = songs_dir.path().join("track.bin");
    std::fs::write(&song_path, vec![0u8; 100]).unwrap();

    let state = test_state(doc_root.path()).await;
    state
        .store
        .add_file(&song_path, &tags("A", "B", "T", 1, 1))
        .await
        .unwrap();
    let hash = Store::hash_path(&song_path);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/stream?song={hash}"))
                .header("Range", "bytes=0-15")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get("content-range").unwrap(),
        "bytes 0-15/100"
    );
    let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(bytes.len(), 16);
}

#[tokio::test]
async fn range_with_only_start_returns_full_file() {
    let doc_root = tempfile::tempdir().unwrap();
    let songs_dir = tempfile::tempdir().unwrap();
    let song_path = songs_dir.path().join("track.bin");
    std::fs::write(&song_path, vec![0u8; 1000]).unwrap();

    let state = test_state(doc_root.path()).await;
    state
        .store
        .add_file(&song_path, &tags("A", "B", "T", 1, 1))
        .await
        .unwrap();
    let hash = Store::hash_path(&song_path);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/stream?song={hash}"))
                .header("Range", "bytes=0-")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), 4096).await.unwrap();
    assert_eq!(bytes.len(), 1000);
}

#[tokio::test]
async fn path_traversal_is_rejected() {
    let doc_root = tempfile::tempdir().unwrap();
    std::fs::write(doc_root.path().join("index.html"), b"home").unwrap();
    let router = build_router(test_state(doc_root.path()).await);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/../etc/passwd")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn static_root_serves_index_html() {
    let doc_root = tempfile::tempdir().unwrap();
    std::fs::write(doc_root.path().join("index.html"), b"home page").unwrap();
    let router = build_router(test_state(doc_root.path()).await);

    let response = router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"home page");
}
