//! GitHub REST client
//!
//! Thin typed wrapper over the handful of endpoints cultivator needs. A client
//! authenticates either as the App itself (JWT) or as one installation
//! (installation access token); the token is looked up per request so a long
//! run transparently picks up re-minted installation tokens.

use std::sync::Arc;

use reqwest::{header, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::CredentialProvider;
use crate::error::{CultivatorError, Result};

pub(crate) const USER_AGENT: &str = "cultivator";
pub(crate) const API_VERSION: &str = "2022-11-28";
const PER_PAGE: u32 = 100;

/// The authenticated GitHub App (`GET /app`).
#[derive(Debug, Clone, Deserialize)]
pub struct App {
    pub slug: String,
}

/// User or organization owning an installation or repository.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
}

/// One grant of the App to an account.
#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    pub id: u64,
    #[serde(default)]
    pub account: Option<Account>,
}

/// Repository metadata as returned by the installation repositories listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: Account,
    pub default_branch: String,
    pub clone_url: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryPage {
    repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Body of `POST /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Serialize)]
pub struct NewPullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

/// Body of `PATCH /repos/{owner}/{repo}/pulls/{number}`; unset fields are left alone.
#[derive(Debug, Default, Serialize)]
pub struct PullRequestUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'a str>,
}

impl<'a> PullRequestUpdate<'a> {
    pub fn close() -> Self {
        Self {
            state: Some("closed"),
            ..Default::default()
        }
    }

    pub fn retitle(title: &'a str, body: &'a str) -> Self {
        Self {
            title: Some(title),
            body: Some(body),
            state: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ClientAuth {
    App,
    Installation(u64),
}

/// GitHub REST client bound to one identity.
#[derive(Clone)]
pub struct GitHubClient {
    credentials: Arc<CredentialProvider>,
    auth: ClientAuth,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.credentials.api_url())
            .field("auth", &self.auth)
            .finish()
    }
}

impl GitHubClient {
    /// Client authenticated as the App (JWT per request).
    pub fn for_app(credentials: Arc<CredentialProvider>) -> Self {
        Self {
            credentials,
            auth: ClientAuth::App,
        }
    }

    /// Client authenticated as a single installation.
    pub fn for_installation(credentials: Arc<CredentialProvider>, installation_id: u64) -> Self {
        Self {
            credentials,
            auth: ClientAuth::Installation(installation_id),
        }
    }

    async fn bearer(&self) -> Result<String> {
        match self.auth {
            ClientAuth::App => self.credentials.app_token(),
            ClientAuth::Installation(id) => self.credentials.installation_token(id).await,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.api_url(), path)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&impl Serialize>,
    ) -> Result<Response> {
        let token = self.bearer().await?;
        let mut builder = request(self.credentials.http(), method.clone(), url, &token);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        debug!(method = %method, url = %url, "GitHub API request");
        check_status(builder.send().await?).await
    }

    async fn get_paginated<P, T>(&self, path: &str, items_of: impl Fn(P) -> Vec<T>) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut next = Some(format!("{}?per_page={}", self.url(path), PER_PAGE));

        while let Some(url) = next.take() {
            let response = self.send(Method::GET, &url, &[], None::<&()>).await?;
            next = response
                .headers()
                .get(header::LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_page_url);
            let page: P = response.json().await?;
            items.extend(items_of(page));
        }

        Ok(items)
    }

    /// `GET /app`
    pub async fn get_app(&self) -> Result<App> {
        let response = self.send(Method::GET, &self.url("/app"), &[], None::<&()>).await?;
        Ok(response.json().await?)
    }

    /// `GET /app/installations`, every page.
    pub async fn list_installations(&self) -> Result<Vec<Installation>> {
        self.get_paginated("/app/installations", |page: Vec<Installation>| page)
            .await
    }

    /// `GET /installation/repositories`, every page.
    pub async fn list_installation_repositories(&self) -> Result<Vec<Repository>> {
        self.get_paginated("/installation/repositories", |page: RepositoryPage| {
            page.repositories
        })
        .await
    }

    /// Open pull requests whose head is `head` (`<owner>:<branch>`).
    pub async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
    ) -> Result<Vec<PullRequest>> {
        let url = self.url(&format!("/repos/{}/{}/pulls", owner, repo));
        let per_page = PER_PAGE.to_string();
        let query = [("state", "open"), ("head", head), ("per_page", per_page.as_str())];
        let response = self.send(Method::GET, &url, &query, None::<&()>).await?;
        Ok(response.json().await?)
    }

    /// `POST /repos/{owner}/{repo}/pulls`
    pub async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest<'_>,
    ) -> Result<PullRequest> {
        let url = self.url(&format!("/repos/{}/{}/pulls", owner, repo));
        let response = self.send(Method::POST, &url, &[], Some(pull)).await?;
        Ok(response.json().await?)
    }

    /// `PATCH /repos/{owner}/{repo}/pulls/{number}`
    pub async fn update_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        update: &PullRequestUpdate<'_>,
    ) -> Result<PullRequest> {
        let url = self.url(&format!("/repos/{}/{}/pulls/{}", owner, repo, number));
        let response = self.send(Method::PATCH, &url, &[], Some(update)).await?;
        Ok(response.json().await?)
    }
}

/// Request with the headers every GitHub REST call carries.
pub(crate) fn request(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    bearer: &str,
) -> RequestBuilder {
    http.request(method, url)
        .bearer_auth(bearer)
        .header(header::ACCEPT, "application/vnd.github+json")
        .header(header::USER_AGENT, USER_AGENT)
        .header("X-GitHub-Api-Version", API_VERSION)
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turn a non-success response into `CultivatorError::Api` using GitHub's `message`.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    Err(CultivatorError::api_error(status.as_u16(), message))
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == r#"rel="next""# || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
