use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectResponse {
    pub images: Vec<String>,
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUpdate {
    pub image_url: String,
    pub editor_json: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    pub phrase_id: String,
    pub text: String,
    pub image_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfileIn {
    pub line_id: String,
    pub mbti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthplace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// One entry of the style / tone / option pickers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptItem {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub id: String,
    pub name: String,
    pub tone: String,
    pub style: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateReq {
    pub persona_id: String,
    pub style: String,
    pub tone: String,
    pub options: Vec<String>,
    pub text: String,
}

/// The two backend calls a candidate session needs.
#[async_trait]
pub trait CandidateApi: Send + Sync {
    async fn select(&self, phrase_id: &str, page: u32, per: u32) -> Result<SelectResponse, ApiError>;
    async fn update_content(&self, content_id: &str, body: &ContentUpdate) -> Result<(), ApiError>;
}

/// Thin JSON client for the phrase backend. Every request carries the host
/// platform's ID token as a bearer token when one is configured.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).gzip(true).build()?;
        Ok(Self { client, base: Url::parse(base_url)?, token })
    }

    pub fn base_url(&self) -> &Url { &self.base }

    fn url(&self, path: &str) -> Result<Url, ApiError> { Ok(self.base.join(path)?) }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = self.authed(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.send(self.client.get(self.url(path)?)).await?;
        Ok(resp.json().await?)
    }

    pub async fn create_phrase(&self, text: &str) -> Result<Phrase, ApiError> {
        let req = self.client.post(self.url("/api/phrases")?).json(&serde_json::json!({ "text": text }));
        Ok(self.send(req).await?.json().await?)
    }

    pub async fn list_phrases(&self) -> Result<Vec<Phrase>, ApiError> {
        self.get_json("/api/phrases").await
    }

    /// The backend serves phrase edits outside the `/api` prefix.
    pub async fn update_phrase(&self, phrase_id: &str, text: &str) -> Result<Phrase, ApiError> {
        let path = format!("/phrases/{phrase_id}");
        let req = self.client.patch(self.url(&path)?).json(&serde_json::json!({ "text": text }));
        Ok(self.send(req).await?.json().await?)
    }

    pub async fn create_user_profile(&self, body: &UserProfileIn) -> Result<(), ApiError> {
        self.send(self.client.post(self.url("/api/user_profiles")?).json(body)).await?;
        Ok(())
    }

    pub async fn prompt_styles(&self) -> Result<Vec<PromptItem>, ApiError> { self.get_json("/prompt/styles").await }
    pub async fn prompt_tones(&self) -> Result<Vec<PromptItem>, ApiError> { self.get_json("/prompt/tones").await }
    pub async fn prompt_options(&self) -> Result<Vec<PromptItem>, ApiError> { self.get_json("/prompt/options").await }
    pub async fn prompt_profiles(&self) -> Result<Vec<PersonaProfile>, ApiError> { self.get_json("/prompt/profiles").await }

    pub async fn generate_text(&self, body: &GenerateReq) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct Reply { reply: String }
        let req = self.client.post(self.url("/prompt/generate")?).json(body);
        let r: Reply = self.send(req).await?.json().await?;
        Ok(r.reply)
    }
}

#[async_trait]
impl CandidateApi for ApiClient {
    async fn select(&self, phrase_id: &str, page: u32, per: u32) -> Result<SelectResponse, ApiError> {
        let mut u = self.url("/api/select")?;
        u.query_pairs_mut()
            .append_pair("phrase_id", phrase_id)
            .append_pair("page", &page.to_string())
            .append_pair("per", &per.to_string());
        tracing::debug!(%phrase_id, page, per, "fetching candidate page");
        let resp = self.send(self.client.get(u)).await?;
        Ok(resp.json().await?)
    }

    async fn update_content(&self, content_id: &str, body: &ContentUpdate) -> Result<(), ApiError> {
        let path = format!("/api/contents/{content_id}");
        self.send(self.client.put(self.url(&path)?).json(body)).await?;
        Ok(())
    }
}
