//! End-to-end tests for the lesson API over a real socket.

use std::sync::Arc;

use serde_json::{json, Value};
use shu_ismak::api::{router, AppState};
use shu_ismak::config::GeminiConfig;
use shu_ismak::gemini::GeminiClient;
use shu_ismak::lessons::LessonGraph;
use shu_ismak::progress::ProgressTracker;
use shu_ismak::speech::playback::NullOutput;
use shu_ismak::speech::{AudioCache, PlaybackSlot, SpeechPipeline};
use shu_ismak::store::{KvStore, MemoryStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    base: String,
    http: reqwest::Client,
    gemini: MockServer,
}

async fn start() -> Harness {
    let gemini = MockServer::start().await;
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let tutor = Arc::new(
        GeminiClient::new(GeminiConfig {
            api_key: Some("test-key".into()),
            base_url: gemini.uri(),
            timeout_secs: 5,
            ..GeminiConfig::default()
        })
        .unwrap(),
    );
    let speech = Arc::new(SpeechPipeline::new(
        AudioCache::new(store.clone(), None),
        tutor.clone(),
        tutor.clone(),
        PlaybackSlot::new(Arc::new(NullOutput)),
        24_000,
    ));
    let state = AppState {
        lessons: Arc::new(LessonGraph::sample()),
        progress: Arc::new(ProgressTracker::open(store).await),
        speech,
        tutor,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    Harness {
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
        gemini,
    }
}

impl Harness {
    async fn get(&self, route: &str) -> Value {
        self.http
            .get(format!("{}{route}", self.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn post(&self, route: &str, body: Value) -> Value {
        self.http
            .post(format!("{}{route}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn repeated_speak_is_served_from_cache() {
    let h = start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "مَرْحَبا" }] } }]
        })))
        .expect(1)
        .mount(&h.gemini)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash-preview-tts:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "inlineData": { "data": "AEAAwA==" } }] } }]
        })))
        .expect(1)
        .mount(&h.gemini)
        .await;

    let first = h.post("/speak", json!({ "text": "מַרְחַבַּא" })).await;
    assert_eq!(first["outcome"], "played_fresh");

    let second = h.post("/speak", json!({ "text": "מַרְחַבַּא" })).await;
    assert_eq!(second["outcome"], "played_from_cache");

    let status = h.get("/status").await;
    assert_eq!(status["cache"]["entries"], 1);
    assert_eq!(status["credential_present"], true);
}

#[tokio::test]
async fn speak_failure_is_reported_not_raised() {
    let h = start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&h.gemini)
        .await;

    let outcome = h.post("/speak", json!({ "text": "כַּתַבּ" })).await;
    assert_eq!(outcome["outcome"], "failed");
    assert!(outcome["reason"].as_str().unwrap().contains("normalization"));

    let status = h.get("/status").await;
    assert_eq!(status["cache"]["entries"], 0);
    assert_eq!(status["loading"], false);
}

#[tokio::test]
async fn marking_past_unlocks_present() {
    let h = start().await;

    let locked = h.get("/access/binyan/binyan1/tense/present").await;
    assert_eq!(locked["accessible"], false);
    assert_eq!(h.get("/access/binyan/binyan1/tense/past").await["accessible"], true);

    for verb in ["v1-katab", "v1-akal", "v1-shirib"] {
        h.post(
            "/progress/verb",
            json!({ "binyan": "binyan1", "tense": "past", "verb": verb }),
        )
        .await;
    }

    let progress = h.get("/progress").await;
    assert_eq!(progress["progress"]["verbs"]["binyan1"]["past"]["v1-katab"], true);
    assert!(progress.get("persist_warning").is_none());

    let open = h.get("/access/binyan/binyan1/tense/present").await;
    assert_eq!(open["accessible"], true);

    let path = h.get("/path").await;
    assert_eq!(path["next"]["binyan"], "binyan1");
    assert_eq!(path["next"]["tense"], "present");
}

#[tokio::test]
async fn second_binyan_stays_locked_until_first_is_done() {
    let h = start().await;
    assert_eq!(h.get("/access/binyan/binyan1").await["accessible"], true);
    assert_eq!(h.get("/access/binyan/binyan2").await["accessible"], false);
    assert_eq!(h.get("/access/binyan/unknown").await["accessible"], false);

    for tense in ["past", "present", "future", "imperative"] {
        for verb in ["v1-katab", "v1-akal", "v1-shirib"] {
            h.post(
                "/progress/verb",
                json!({ "binyan": "binyan1", "tense": tense, "verb": verb }),
            )
            .await;
        }
    }
    assert_eq!(h.get("/access/binyan/binyan2").await["accessible"], true);

    h.post("/progress/binyan/reset", json!({ "binyan": "binyan1" })).await;
    assert_eq!(h.get("/access/binyan/binyan2").await["accessible"], false);
}

#[tokio::test]
async fn adjective_categories_toggle_and_reset() {
    let h = start().await;

    let on = h.post("/progress/adjectives/toggle", json!({ "category": "colors" })).await;
    assert_eq!(on["progress"]["adjectives"]["colors"], true);

    let off = h.post("/progress/adjectives/toggle", json!({ "category": "colors" })).await;
    assert_eq!(off["progress"]["adjectives"]["colors"], false);

    h.post("/progress/adjectives/toggle", json!({ "category": "sizes" })).await;
    let reset = h.post("/progress/adjectives/reset", json!({})).await;
    assert_eq!(reset["progress"]["adjectives"], json!({}));
}

#[tokio::test]
async fn unknown_tense_is_bad_request() {
    let h = start().await;
    let resp = h
        .http
        .get(format!("{}/access/binyan/binyan1/tense/pluperfect", h.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tutor_errors_map_to_bad_gateway() {
    let h = start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.gemini)
        .await;

    let resp = h
        .http
        .post(format!("{}/translate", h.base))
        .json(&json!({ "hebrew": "שלום" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
}
