use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, ClientResult, ErrorCode};
use crate::models::{
    AddCommentRequest, AddCommentResponse, CommentPage, EditCommentRequest, ErrorBody, ItemView,
    RatingAggregate, RatingRequest, SearchFilter, SearchResponse, VoteRequest, VoteTally,
};

/// Identity forwarded to the backend in the gateway headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub is_anonymous: bool,
    pub is_moderator: bool,
}

impl Identity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_anonymous: false,
            is_moderator: false,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
    identity: Option<Identity>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let base = sanitize_base_url(base_url.into())?;
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base,
            client,
            identity: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> anyhow::Result<()> {
        self.base_url = sanitize_base_url(base_url.into())?;
        Ok(())
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn read_comments(
        &self,
        item_id: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> ClientResult<CommentPage> {
        let mut url = self.url(&format!("/items/{item_id}/comments"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page_size", &page_size.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        decode(self.authorize(self.client.get(url)).send()?)
    }

    pub fn add_comment(
        &self,
        item_id: &str,
        request: &AddCommentRequest,
    ) -> ClientResult<AddCommentResponse> {
        let url = self.url(&format!("/items/{item_id}/comments"))?;
        decode(self.authorize(self.client.post(url)).json(request).send()?)
    }

    pub fn edit_comment(
        &self,
        item_id: &str,
        comment_id: &str,
        request: &EditCommentRequest,
    ) -> ClientResult<()> {
        let url = self.url(&format!("/items/{item_id}/comments/{comment_id}"))?;
        let response = self.authorize(self.client.put(url)).json(request).send()?;
        check(response).map(|_| ())
    }

    pub fn delete_comment(&self, item_id: &str, comment_id: &str) -> ClientResult<()> {
        let url = self.url(&format!("/items/{item_id}/comments/{comment_id}"))?;
        let response = self.authorize(self.client.delete(url)).send()?;
        check(response).map(|_| ())
    }

    pub fn set_vote(&self, item_id: &str, comment_id: &str, value: i64) -> ClientResult<VoteTally> {
        let url = self.url(&format!("/items/{item_id}/comments/{comment_id}/vote"))?;
        decode(
            self.authorize(self.client.put(url))
                .json(&VoteRequest { value })
                .send()?,
        )
    }

    pub fn set_rating(&self, item_id: &str, value: i64) -> ClientResult<RatingAggregate> {
        let url = self.url(&format!("/items/{item_id}/rating"))?;
        decode(
            self.authorize(self.client.put(url))
                .json(&RatingRequest { value })
                .send()?,
        )
    }

    pub fn get_item(&self, item_id: &str) -> ClientResult<ItemView> {
        let url = self.url(&format!("/items/{item_id}"))?;
        decode(self.authorize(self.client.get(url)).send()?)
    }

    pub fn search(&self, filter: &SearchFilter) -> ClientResult<Vec<ItemView>> {
        let url = self.url("/items/search")?;
        let response: SearchResponse =
            decode(self.authorize(self.client.post(url)).json(filter).send()?)?;
        Ok(response.items)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.identity {
            Some(identity) => request
                .header("x-user-id", &identity.user_id)
                .header("x-user-anonymous", identity.is_anonymous.to_string())
                .header("x-user-moderator", identity.is_moderator.to_string()),
            None => request,
        }
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        let mut url = Url::parse(&self.base_url).context("invalid base URL")?;
        url.set_path(path.trim_start_matches('/'));
        Ok(url)
    }
}

/// Turns a non-success response into a typed [`ClientError`].
fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().unwrap_or_default();
    Err(error_from_body(status.as_u16(), &text))
}

fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let response = check(response)?;
    Ok(response.json()?)
}

pub(crate) fn error_from_body(status: u16, text: &str) -> ClientError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => ClientError::Api {
            status,
            code: ErrorCode::parse(&body.code),
            message: body.message,
        },
        Err(_) => ClientError::Api {
            status,
            code: ErrorCode::Unknown(format!("HTTP {status}")),
            message: text.trim().to_string(),
        },
    }
}

fn sanitize_base_url(mut base: String) -> anyhow::Result<String> {
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("http://{base}");
    }
    while base.ends_with('/') {
        base.pop();
    }
    let _ = Url::parse(&base).context("invalid base URL")?;
    Ok(base)
}
