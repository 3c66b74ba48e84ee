#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use mediahive_core::{
    CacheDirs, CacheSettings, LibraryRoots, MediaLibrary, testing::FakeRunner,
};
use mediahive_server::{AppState, create_app, infra::middleware::ApiTokens};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TOKEN: &str = "test-token";

pub struct TestServer {
    pub dir: TempDir,
    pub runner: Arc<FakeRunner>,
    pub app: Router,
}

impl TestServer {
    /// Roots `movies`, `comics` and `public`; only `public` is allow-listed.
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let library_dir = dir.path().join("library");
        let dirs: Vec<PathBuf> = ["movies", "comics", "public"]
            .iter()
            .map(|name| library_dir.join(name))
            .collect();
        for root in &dirs {
            std::fs::create_dir_all(root).unwrap();
        }

        let roots = LibraryRoots::from_dirs(dirs, vec!["public".to_string()]);
        let settings = CacheSettings::new(CacheDirs::under(&dir.path().join("storage")));
        let runner = FakeRunner::new();
        let library = MediaLibrary::new(roots, settings, runner.clone());
        library.prepare().await.unwrap();

        let app = create_app(AppState::new(library, ApiTokens::new([TOKEN])));
        Self { dir, runner, app }
    }

    pub fn root(&self, id: &str) -> PathBuf {
        self.dir.path().join("library").join(id)
    }

    pub fn write(&self, root: &str, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root(root).join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn storage(&self) -> PathBuf {
        self.dir.path().join("storage")
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// GET with the test bearer token.
    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(authorized(Request::get(uri)).body(Body::empty()).unwrap())
            .await
    }

    /// GET without any credentials.
    pub async fn get_anonymous(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }
}

pub fn authorized(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn json_body(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

