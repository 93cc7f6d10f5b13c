//! GitHub REST v3 content store.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::ContentStore;
use crate::config::OnboardConfig;
use crate::error::StoreError;

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct FileContent {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Deserialize)]
struct PullSummary {
    head: PullHead,
}

#[derive(Deserialize)]
struct PullHead {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Deserialize)]
struct CreatedPull {
    html_url: String,
}

/// Content store backed by a GitHub repository
pub struct GitHubStore {
    client: Client,
    api_url: String,
    repo: String,
    token: Option<String>,
}

impl GitHubStore {
    /// `repo` is `owner/name`
    pub fn new(
        api_url: &str,
        repo: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        if !repo.contains('/') {
            return Err(StoreError::Config(format!(
                "repository `{}` is not in owner/name form",
                repo
            )));
        }

        let client = Client::builder()
            .user_agent("onboard-core/0.1")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token,
        })
    }

    pub fn from_config(config: &OnboardConfig) -> Result<Self, StoreError> {
        let repo = config
            .repository
            .repo
            .as_deref()
            .ok_or_else(|| StoreError::Config("GITHUB_REPO is not set".to_string()))?;
        Self::new(
            &config.repository.api_url,
            repo,
            config.repository.token.clone(),
            config.http_timeout(),
        )
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.repo, tail)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Pass 2xx responses through, turn the rest into [`StoreError::Status`]
    async fn ok(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn file(&self, branch: &str, path: &str) -> Result<Option<FileContent>, StoreError> {
        let url = format!(
            "{}?ref={}",
            self.url(&format!("contents/{}", path)),
            urlencoding::encode(branch)
        );
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let file = Self::ok(response).await?.json::<FileContent>().await?;
        Ok(Some(file))
    }

    fn owner(&self) -> &str {
        self.repo.split('/').next().unwrap_or_default()
    }
}

#[async_trait]
impl ContentStore for GitHubStore {
    #[instrument(skip(self))]
    async fn branch_exists(&self, name: &str) -> Result<bool, StoreError> {
        let url = self.url(&format!("branches/{}", name));
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::ok(response).await?;
        Ok(true)
    }

    async fn default_branch(&self) -> Result<String, StoreError> {
        let url = format!("{}/repos/{}", self.api_url, self.repo);
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let info = Self::ok(response).await?.json::<RepoInfo>().await?;
        Ok(info.default_branch)
    }

    #[instrument(skip(self))]
    async fn create_branch(&self, name: &str, from: &str) -> Result<(), StoreError> {
        let url = self.url(&format!("git/ref/heads/{}", from));
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::BranchNotFound(from.to_string()));
        }
        let head = Self::ok(response).await?.json::<GitRef>().await?;

        let response = self
            .request(reqwest::Method::POST, &self.url("git/refs"))
            .json(&json!({
                "ref": format!("refs/heads/{}", name),
                "sha": head.object.sha,
            }))
            .send()
            .await?;
        Self::ok(response).await?;
        debug!(branch = name, from, "Created branch");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_file_content(
        &self,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>, StoreError> {
        let Some(file) = self.file(branch, path).await? else {
            return Ok(None);
        };
        if !file.encoding.is_empty() && file.encoding != "base64" {
            return Err(StoreError::Payload(format!(
                "unsupported content encoding `{}`",
                file.encoding
            )));
        }

        let packed: String = file.content.split_whitespace().collect();
        let bytes = STANDARD
            .decode(packed)
            .map_err(|e| StoreError::Payload(format!("invalid base64 content: {}", e)))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| StoreError::Payload(format!("file is not UTF-8: {}", e)))?;
        Ok(Some(text))
    }

    #[instrument(skip(self, content))]
    async fn put_file_content(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(content.as_bytes()),
            "branch": branch,
        });
        if let Some(existing) = self.file(branch, path).await? {
            body["sha"] = json!(existing.sha);
        }

        let response = self
            .request(reqwest::Method::PUT, &self.url(&format!("contents/{}", path)))
            .json(&body)
            .send()
            .await?;
        Self::ok(response).await?;
        Ok(())
    }

    async fn pull_request_exists(&self, head: &str, base: &str) -> Result<bool, StoreError> {
        let url = format!(
            "{}?state=open&base={}&head={}",
            self.url("pulls"),
            urlencoding::encode(base),
            urlencoding::encode(&format!("{}:{}", self.owner(), head))
        );
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let pulls = Self::ok(response).await?.json::<Vec<PullSummary>>().await?;
        Ok(pulls.iter().any(|pr| pr.head.branch == head))
    }

    #[instrument(skip(self, body))]
    async fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<String, StoreError> {
        let response = self
            .request(reqwest::Method::POST, &self.url("pulls"))
            .json(&json!({
                "title": title,
                "body": body,
                "head": head,
                "base": base,
            }))
            .send()
            .await?;
        let created = Self::ok(response).await?.json::<CreatedPull>().await?;
        Ok(created.html_url)
    }
}
