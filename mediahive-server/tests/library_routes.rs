mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{TestServer, authorized, body_bytes, json_body};
use mediahive_core::{Tool, testing::FAKE_FFMPEG_OUTPUT};
use serde_json::json;

#[tokio::test]
async fn health_needs_no_token() {
    let server = TestServer::start().await;
    let response = server.get_anonymous("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "ok": true }));
}

#[tokio::test]
async fn private_routes_require_a_known_bearer_token() {
    let server = TestServer::start().await;

    let response = server.get_anonymous("/api/library/browse").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["status"], 401);

    let request = Request::get("/api/library/browse")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.send(request).await.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(server.get("/api/library/browse").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn browsing_an_empty_directory_returns_no_items() {
    let server = TestServer::start().await;
    let response = server.get("/api/library/browse?library=movies").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["currentPath"], "");
    assert_eq!(body["libraryRoot"]["id"], "movies");
    assert_eq!(body["libraryRoots"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn archive_scenario_over_http() {
    let server = TestServer::start().await;
    server.write("comics", "vol1.cbz", b"zip");
    server.runner.register_archive(
        "vol1.cbz",
        [
            ("page10.jpg", b"10".to_vec()),
            ("page2.jpg", b"2".to_vec()),
            ("page1.jpg", b"1".to_vec()),
            ("page9.jpg", b"9".to_vec()),
        ],
    );

    let listing = json_body(server.get("/api/library/browse?library=comics").await).await;
    let items = listing["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["mediaKind"], "archive");
    assert!(items[0]["thumbnail"].is_string());

    let response = server
        .get("/api/library/archive/browse?path=vol1.cbz&library=comics&scope=library")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let context = json_body(response).await;
    let names: Vec<_> = context["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["page1.jpg", "page2.jpg", "page9.jpg", "page10.jpg"]);
    assert!(
        context["items"]
            .as_array()
            .unwrap()
            .iter()
            .all(|item| item["source"] == "extracted")
    );

    let pages = json_body(
        server
            .get("/api/library/archive/pages?path=vol1.cbz&library=comics")
            .await,
    )
    .await;
    let first = pages["pages"][0].as_str().unwrap().to_string();
    assert!(first.starts_with("/extracted/"), "{first}");
    assert!(first.ends_with("page1.jpg"), "{first}");

    let page = server.get_anonymous(&first).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(body_bytes(page).await, b"1");

    assert_eq!(server.runner.calls(Tool::Unzip), 1);
}

#[tokio::test]
async fn extract_accepts_a_json_body_and_is_idempotent() {
    let server = TestServer::start().await;
    server.write("comics", "series/vol2.cbz", b"zip");
    server
        .runner
        .register_archive("vol2.cbz", [("001.png", b"a".to_vec())]);

    let extract = || {
        authorized(Request::post("/api/library/archive/extract"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "path": "series/vol2.cbz", "library": "comics" }).to_string(),
            ))
            .unwrap()
    };

    let first = json_body(server.send(extract()).await).await;
    let second = json_body(server.send(extract()).await).await;
    assert!(first["extractedPath"].is_string());
    assert_eq!(first, second);
    assert_eq!(server.runner.calls(Tool::Unzip), 1);

    let extracted = server
        .storage()
        .join("extracted")
        .join(first["extractedPath"].as_str().unwrap());
    assert!(extracted.join("001.png").is_file());
}

#[tokio::test]
async fn extract_falls_back_to_query_parameters() {
    let server = TestServer::start().await;
    server.write("comics", "vol3.cbz", b"zip");
    server
        .runner
        .register_archive("vol3.cbz", [("p.jpg", b"p".to_vec())]);

    let request = authorized(Request::post(
        "/api/library/archive/extract?path=vol3.cbz&library=comics",
    ))
    .body(Body::empty())
    .unwrap();
    assert_eq!(server.send(request).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn extracting_a_non_archive_is_a_client_error() {
    let server = TestServer::start().await;
    server.write("movies", "film.mp4", b"video");

    let response = server
        .get("/api/library/archive/pages?path=film.mp4&library=movies")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ranged_stream_returns_partial_content() {
    let server = TestServer::start().await;
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    server.write("movies", "book.epub", &data);

    let request = authorized(Request::get("/api/library/stream?path=book.epub&library=movies"))
        .header(header::RANGE, "bytes=200-299")
        .body(Body::empty())
        .unwrap();
    let response = server.send(request).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 200-299/1000");
    assert_eq!(headers[header::CONTENT_LENGTH], "100");
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(headers[header::CONTENT_TYPE], "application/epub+zip");
    assert_eq!(body_bytes(response).await, &data[200..300]);
}

#[tokio::test]
async fn unranged_stream_returns_the_whole_file() {
    let server = TestServer::start().await;
    server.write("movies", "notes.srt", b"1\n00:00:01,000 --> 00:00:02,000\nhi\n");

    let response = server
        .get("/api/library/stream?path=notes.srt&library=movies")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    assert!(response.headers().get(header::CONTENT_RANGE).is_none());
    assert_eq!(body_bytes(response).await.len(), 35);
}

#[tokio::test]
async fn incompatible_video_is_transcoded_once() {
    let server = TestServer::start().await;
    server.write("movies", "film.mkv", b"matroska");

    for _ in 0..2 {
        let response = server
            .get("/api/library/stream?path=film.mkv&library=movies")
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(body_bytes(response).await, FAKE_FFMPEG_OUTPUT);
    }
    assert_eq!(server.runner.calls(Tool::Ffmpeg), 1);
}

#[tokio::test]
async fn ios_flag_forces_a_transcode_of_compatible_video() {
    let server = TestServer::start().await;
    server.write("movies", "clip.mp4", b"mp4 bytes");

    let direct = server
        .get("/api/library/stream?path=clip.mp4&library=movies")
        .await;
    assert_eq!(body_bytes(direct).await, b"mp4 bytes");
    assert_eq!(server.runner.calls(Tool::Ffmpeg), 0);

    let forced = server
        .get("/api/library/stream?path=clip.mp4&library=movies&optimize=ios")
        .await;
    assert_eq!(body_bytes(forced).await, FAKE_FFMPEG_OUTPUT);
    assert_eq!(server.runner.calls(Tool::Ffmpeg), 1);
}

#[tokio::test]
async fn missing_ffmpeg_is_a_masked_server_error() {
    let server = TestServer::start().await;
    server.write("movies", "film.avi", b"avi");
    server.runner.set_missing(Tool::Ffmpeg);

    let response = server
        .get("/api/library/stream?path=film.avi&library=movies")
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(!body["error"]["message"].as_str().unwrap().contains("ffmpeg"));
}

#[tokio::test]
async fn traversal_and_bad_input_are_rejected() {
    let server = TestServer::start().await;

    for uri in [
        "/api/library/browse?path=../../etc&library=movies",
        "/api/library/stream?path=..%2Fsecret&library=comics",
        "/api/library/browse?library=nope",
        "/api/library/stream?library=movies",
        "/api/library/archive/browse?path=a.cbz&scope=sideways",
    ] {
        let response = server.get(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body = json_body(response).await;
        assert_eq!(body["error"]["status"], 400, "{uri}");
    }
}

#[tokio::test]
async fn missing_files_are_not_found() {
    let server = TestServer::start().await;
    let response = server
        .get("/api/library/stream?path=ghost.mp4&library=movies")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server.get("/api/library/info?path=ghost.mp4").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn file_info_describes_a_file() {
    let server = TestServer::start().await;
    server.write("movies", "Show/ep1.mkv", b"12345");

    let info = json_body(
        server
            .get("/api/library/info?path=Show/ep1.mkv&library=movies")
            .await,
    )
    .await;
    assert_eq!(info["relativePath"], "Show/ep1.mkv");
    assert_eq!(info["mediaKind"], "video");
    assert_eq!(info["stats"]["size"], 5);
    assert_eq!(info["libraryRoot"]["id"], "movies");
}

#[tokio::test]
async fn video_thumbnails_are_served_statically() {
    let server = TestServer::start().await;
    server.write("movies", "film.mp4", b"video");

    let listing = json_body(server.get("/api/library/browse?library=movies").await).await;
    let thumbnail = listing["items"][0]["thumbnail"].as_str().unwrap().to_string();
    assert!(thumbnail.starts_with("/thumbnails/"), "{thumbnail}");

    let response = server.get_anonymous(&thumbnail).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, FAKE_FFMPEG_OUTPUT);
}
