use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use image::{DynamicImage, ImageBuffer, Rgba};
use parking_lot::Mutex;
use serde_json::{json, Value};

use phrasecard::client::{GenerateReq, PersonaProfile, PromptItem, UserProfileIn};
use phrasecard::editor::EditorState;
use phrasecard::{ApiClient, ApiError, CandidateApi, CandidateLoader, HttpImageFetcher, LoaderParams};

#[derive(Clone, Default)]
struct Backend {
    base: Arc<Mutex<String>>,
    select_calls: Arc<Mutex<Vec<HashMap<String, String>>>>,
    updates: Arc<Mutex<Vec<(String, Value)>>>,
    proxied: Arc<Mutex<Vec<String>>>,
    phrases: Arc<Mutex<Vec<Value>>>,
    profiles: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

fn png(level: u8) -> Vec<u8> {
    let v = level.min(15) * 16;
    let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(8, 8, Rgba([v, v, v, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
    buf
}

/// `<token>_L<level>.png` -> level
fn level_of(name: &str) -> u8 {
    name.rsplit_once("_L")
        .and_then(|(_, rest)| rest.trim_end_matches(".png").parse().ok())
        .unwrap_or(0)
}

async fn select(State(b): State<Backend>, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    b.select_calls.lock().push(q.clone());
    let base = b.base.lock().clone();
    let phrase = q.get("phrase_id").cloned().unwrap_or_default();
    if phrase == "boom" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "kaboom").into_response();
    }
    let images: Vec<String> = match q.get("page").map(String::as_str) {
        Some("1") => vec![
            format!("{base}/img/aaaa0001_L1.png"),
            format!("{base}/img/aaaa0002_L2.png"),
            format!("{base}/img/aaaa0001_L9.png?w=100"),
            format!("{base}/img/bbbb0001_L2.png"),
            format!("{base}/blocked/cccc0001_L3.png"),
            format!("{base}/blocked/cccc0002_L3.png"),
            format!("{base}/img/dddd0001_L4.png"),
            format!("{base}/img/dddd0002_L5.png"),
            format!("{base}/img/dddd0003_L6.png"),
            format!("{base}/img/dddd0004_L7.png"),
        ],
        Some("2") => vec![
            format!("{base}/img/eeee0001_L8.png"),
            format!("{base}/missing/ffff0001_L9.png"),
        ],
        _ => vec![],
    };
    Json(json!({ "images": images, "content_id": format!("content-{phrase}"), "text": "今日もいい日" })).into_response()
}

async fn serve_img(Path(name): Path<String>) -> impl IntoResponse {
    ([("content-type", "image/png")], png(level_of(&name)))
}

async fn proxy(State(b): State<Backend>, headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer tok") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let target = q.get("url").cloned().unwrap_or_default();
    b.proxied.lock().push(target.clone());
    if target.contains("/missing/") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let name = target.rsplit('/').next().unwrap_or_default();
    ([("content-type", "image/png")], png(level_of(name))).into_response()
}

async fn update_content(State(b): State<Backend>, Path(id): Path<String>, Json(body): Json<Value>) -> StatusCode {
    b.updates.lock().push((id, body));
    StatusCode::NO_CONTENT
}

async fn create_phrase(State(b): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
    let mut phrases = b.phrases.lock();
    let p = json!({
        "phrase_id": format!("ph{}", phrases.len() + 1),
        "text": body["text"],
        "image_url": null,
        "created_at": "2026-10-16T00:00:00Z",
    });
    phrases.push(p.clone());
    Json(p)
}

async fn list_phrases(State(b): State<Backend>) -> Json<Value> {
    Json(Value::Array(b.phrases.lock().clone()))
}

async fn update_phrase(State(b): State<Backend>, Path(id): Path<String>, Json(body): Json<Value>) -> impl IntoResponse {
    let mut phrases = b.phrases.lock();
    match phrases.iter_mut().find(|p| p["phrase_id"] == id.as_str()) {
        Some(p) => {
            p["text"] = body["text"].clone();
            Json(p.clone()).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn create_profile(State(b): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> StatusCode {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_string);
    b.profiles.lock().push((auth, body));
    StatusCode::CREATED
}

async fn start() -> (String, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/api/select", get(select))
        .route("/img/{name}", get(serve_img))
        .route("/blocked/{name}", get(|| async { StatusCode::FORBIDDEN }))
        .route("/missing/{name}", get(|| async { StatusCode::NOT_FOUND }))
        .route("/api/proxy-image", get(proxy))
        .route("/api/contents/{id}", put(update_content))
        .route("/api/phrases", post(create_phrase).get(list_phrases))
        .route("/phrases/{id}", patch(update_phrase))
        .route("/api/user_profiles", post(create_profile))
        .route("/prompt/tones", get(|| async { Json(json!([{ "key": "bright_naive", "label": "明るく" }])) }))
        .route("/prompt/options", get(|| async { Json(json!([{ "key": "osaka", "label": "大阪弁" }])) }))
        .route(
            "/prompt/profiles",
            get(|| async {
                Json(json!([{
                    "id": "user_001",
                    "name": "はな",
                    "tone": "bright_naive",
                    "style": "poet",
                    "options": ["osaka"],
                }]))
            }),
        )
        .route("/prompt/styles", get(|| async { Json(json!([{ "key": "poet", "label": "詩人" }])) }))
        .route(
            "/prompt/generate",
            post(|Json(body): Json<Value>| async move { Json(json!({ "reply": format!("{}!", body["text"].as_str().unwrap_or("")) })) }),
        )
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *backend.base.lock() = base.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (base, backend)
}

fn http_loader(base: &str) -> CandidateLoader {
    let api = ApiClient::new(base, Some("tok".into()), Duration::from_secs(5)).unwrap();
    let fetcher = HttpImageFetcher::new(Duration::from_secs(5), 1024 * 1024)
        .unwrap()
        .with_proxy(base, Some("tok".into()))
        .unwrap();
    CandidateLoader::new(
        Arc::new(api),
        Arc::new(fetcher),
        LoaderParams { batch_pause: Duration::from_millis(1), ..LoaderParams::default() },
    )
}

#[tokio::test]
async fn loads_and_dedupes_candidates_over_http() {
    let (base, backend) = start().await;
    let loader = http_loader(&base);

    loader.reset("p1").await.unwrap();
    let got = loader.candidates();
    let expected: Vec<String> = [
        "/img/aaaa0001_L1.png",
        "/img/aaaa0002_L2.png",
        "/blocked/cccc0001_L3.png",
        "/img/dddd0001_L4.png",
        "/img/dddd0002_L5.png",
        "/img/dddd0003_L6.png",
        "/img/dddd0004_L7.png",
    ]
    .iter()
    .map(|p| format!("{base}{p}"))
    .collect();
    assert_eq!(got, expected);
    assert!(loader.has_more());

    loader.load().await.unwrap();
    let got = loader.candidates();
    assert_eq!(got.len(), 9);
    assert!(got[8].ends_with("/missing/ffff0001_L9.png"));
    assert!(!loader.has_more());

    let calls = backend.select_calls.lock().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0]["phrase_id"], "p1");
    assert_eq!(calls[0]["page"], "1");
    assert_eq!(calls[1]["page"], "2");
    assert!(calls.iter().all(|c| c["per"] == "10"));

    // blocked and missing images went through the proxy; plain ones did not
    let proxied = backend.proxied.lock().clone();
    assert_eq!(proxied.len(), 3);
    assert!(proxied.iter().all(|u| !u.contains("/img/")));
}

#[tokio::test]
async fn choose_puts_editor_json() {
    let (base, backend) = start().await;
    let loader = http_loader(&base);
    loader.reset("p1").await.unwrap();

    let pick = loader.candidates()[0].clone();
    let mut editor = EditorState::new(pick.clone());
    editor.text = loader.phrase_text();
    loader.choose(&pick, &editor, None).await.unwrap();

    let updates = backend.updates.lock().clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "content-p1");
    assert_eq!(updates[0].1["image_url"], pick.as_str());
    assert!(updates[0].1.get("status").is_none());
    let stored = EditorState::from_json(updates[0].1["editor_json"].as_str().unwrap()).unwrap();
    assert_eq!(stored.text.as_deref(), Some("今日もいい日"));
}

#[tokio::test]
async fn non_success_status_becomes_api_error() {
    let (base, _) = start().await;
    let api = ApiClient::new(&base, None, Duration::from_secs(5)).unwrap();
    match api.select("boom", 1, 10).await {
        Err(ApiError::Status { status: 500, body }) => assert_eq!(body, "kaboom"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn phrase_and_prompt_endpoints() {
    let (base, _) = start().await;
    let api = ApiClient::new(&base, Some("tok".into()), Duration::from_secs(5)).unwrap();

    let created = api.create_phrase("おはよう").await.unwrap();
    assert_eq!(created.phrase_id, "ph1");
    assert_eq!(created.text, "おはよう");
    assert!(created.image_url.is_none());
    assert_eq!(api.list_phrases().await.unwrap(), vec![created]);

    assert_eq!(
        api.prompt_styles().await.unwrap(),
        vec![PromptItem { key: "poet".into(), label: "詩人".into() }]
    );

    let reply = api
        .generate_text(&GenerateReq {
            persona_id: "user_001".into(),
            style: "poet".into(),
            tone: "bright_naive".into(),
            options: vec!["osaka".into()],
            text: "hi".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply, "hi!");
}

#[tokio::test]
async fn phrase_update_profile_and_prompt_catalogues() {
    let (base, backend) = start().await;
    let api = ApiClient::new(&base, Some("tok".into()), Duration::from_secs(5)).unwrap();

    let created = api.create_phrase("おはよう").await.unwrap();
    let updated = api.update_phrase(&created.phrase_id, "こんばんは").await.unwrap();
    assert_eq!(updated.phrase_id, created.phrase_id);
    assert_eq!(updated.text, "こんばんは");
    assert_eq!(api.list_phrases().await.unwrap(), vec![updated]);
    match api.update_phrase("nope", "x").await {
        Err(ApiError::Status { status: 404, .. }) => {}
        other => panic!("unexpected {other:?}"),
    }

    let profile = UserProfileIn {
        line_id: "U123".into(),
        mbti: "INFP".into(),
        residence: Some("大阪".into()),
        ..UserProfileIn::default()
    };
    api.create_user_profile(&profile).await.unwrap();
    let profiles = backend.profiles.lock().clone();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].0.as_deref(), Some("Bearer tok"));
    assert_eq!(profiles[0].1["line_id"], "U123");
    assert_eq!(profiles[0].1["residence"], "大阪");
    assert!(profiles[0].1.get("birthplace").is_none());

    assert_eq!(api.prompt_tones().await.unwrap(), vec![PromptItem { key: "bright_naive".into(), label: "明るく".into() }]);
    assert_eq!(api.prompt_options().await.unwrap(), vec![PromptItem { key: "osaka".into(), label: "大阪弁".into() }]);
    assert_eq!(
        api.prompt_profiles().await.unwrap(),
        vec![PersonaProfile {
            id: "user_001".into(),
            name: "はな".into(),
            tone: "bright_naive".into(),
            style: "poet".into(),
            options: vec!["osaka".into()],
        }]
    );
}
