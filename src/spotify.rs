use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::api::AppState;
use crate::config::Config;
use crate::credentials::{Credential, TokenProvider};
use crate::error::{AppError, UpstreamError};

/// Page size of catalog searches.
const SEARCH_LIMIT: u32 = 20;

pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_url: String,
}

impl SpotifyClient {
    pub fn new(config: &Config) -> Self {
        Self::with_urls(
            &config.client_id,
            &config.client_secret,
            &config.spotify_token_url,
            &config.spotify_api_url,
        )
    }

    pub fn with_urls(client_id: &str, client_secret: &str, token_url: &str, api_url: &str) -> Self {
        Self {
            client: Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token_url: token_url.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Searches the catalog for tracks and returns the provider's JSON as is.
    pub async fn search_tracks(&self, access_token: &str, query: &str, offset: u32) -> Result<Value, UpstreamError> {
        debug!("Searching catalog for {:?} at offset {}", query, offset);

        let response = self
            .client
            .get(format!("{}/search", self.api_url))
            .query(&[
                ("type", "track".to_string()),
                ("q", query.to_string()),
                ("limit", SEARCH_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ])
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(UpstreamError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TokenProvider for SpotifyClient {
    async fn fetch_token(&self) -> Result<Credential, UpstreamError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(UpstreamError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub offset: Option<u32>,
}

// GET /generate_token - Renew the catalog access token and return it
pub async fn generate_token(State(state): State<AppState>) -> Result<Json<Credential>, AppError> {
    Ok(Json(state.refresher.renew().await?))
}

// GET /search/:search - Proxy a track search to the catalog
pub async fn search(
    State(state): State<AppState>,
    Path(search): Path<String>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let token = state
        .refresher
        .credentials()
        .access_token()
        .await
        .ok_or(UpstreamError::NoCredential)?;

    let results = state
        .spotify
        .search_tracks(&token, &search, params.offset.unwrap_or(0))
        .await?;
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Form,
        http::HeaderMap,
        routing::{get, post},
        Router,
    };
    use serde_json::json;
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn fetch_token_sends_client_credentials() {
        let router = Router::new().route(
            "/api/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form["grant_type"], "client_credentials");
                assert_eq!(form["client_id"], "id");
                assert_eq!(form["client_secret"], "secret");
                Json(json!({ "access_token": "abc", "token_type": "Bearer", "expires_in": 3600 }))
            }),
        );
        let base = serve(router).await;
        let client = SpotifyClient::with_urls("id", "secret", &format!("{}/api/token", base), &base);

        let credential = client.fetch_token().await.unwrap();
        assert_eq!(credential.access_token, "abc");
        assert_eq!(credential.expires_in, 3600);
    }

    #[tokio::test]
    async fn fetch_token_rejects_non_200() {
        let router = Router::new().route("/api/token", post(|| async { StatusCode::BAD_REQUEST }));
        let base = serve(router).await;
        let client = SpotifyClient::with_urls("id", "secret", &format!("{}/api/token", base), &base);

        let err = client.fetch_token().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status(StatusCode::BAD_REQUEST)));
    }

    #[tokio::test]
    async fn search_forwards_query_and_bearer() {
        let router = Router::new().route(
            "/v1/search",
            get(|headers: HeaderMap, Query(query): Query<HashMap<String, String>>| async move {
                assert_eq!(headers["authorization"], "Bearer abc");
                Json(json!({ "query": query }))
            }),
        );
        let base = serve(router).await;
        let client = SpotifyClient::with_urls("id", "secret", &base, &format!("{}/v1/", base));

        let results = client.search_tracks("abc", "let it be", 40).await.unwrap();
        assert_eq!(
            results,
            json!({ "query": { "type": "track", "q": "let it be", "limit": "20", "offset": "40" } })
        );
    }
}
