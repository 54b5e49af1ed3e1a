//! HTTP snapshot fetch from the NVR

use digest_auth::AuthContext;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode};
use ws_security::Credentials;

use crate::error::ClientError;

/// GET `http://{host}:{port}{path}`, answering a Digest or Basic challenge if
/// the device sends one.
pub async fn fetch_snapshot(
    http: &Client,
    host: &str,
    port: u16,
    path: &str,
    credentials: Option<&Credentials>,
) -> Result<Vec<u8>, ClientError> {
    let url = format!("http://{}:{}{}", host, port, path);
    let resp = http.get(&url).send().await?;

    let resp = match (resp.status(), credentials) {
        (StatusCode::UNAUTHORIZED, Some(creds)) => {
            let challenge = resp
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if challenge.to_ascii_lowercase().starts_with("digest") {
                let context = AuthContext::new(&creds.username, &creds.password, path);
                let mut prompt = digest_auth::parse(&challenge)
                    .map_err(|e| ClientError::DigestAuth(e.to_string()))?;
                let authorization = prompt
                    .respond(&context)
                    .map_err(|e| ClientError::DigestAuth(e.to_string()))?
                    .to_header_string();
                http.get(&url).header(AUTHORIZATION, authorization).send().await?
            } else {
                http.get(&url)
                    .basic_auth(&creds.username, Some(&creds.password))
                    .send()
                    .await?
            }
        }
        _ => resp,
    };

    if !resp.status().is_success() {
        return Err(ClientError::Status(resp.status().as_u16()));
    }
    Ok(resp.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::get;
    use axum::Router;

    async fn digest_protected(headers: HeaderMap) -> (AxumStatus, [(&'static str, &'static str); 1], Vec<u8>) {
        if headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Digest ") && v.contains("uri=\"/snap.jpg\""))
        {
            return (AxumStatus::OK, [("Content-Type", "image/jpeg")], vec![0xFF, 0xD8, 0xFF]);
        }
        (
            AxumStatus::UNAUTHORIZED,
            [("WWW-Authenticate", r#"Digest realm="cam", nonce="abc123", qop="auth""#)],
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_digest_snapshot() {
        let app = Router::new()
            .route("/snap.jpg", get(digest_protected))
            .route("/missing", get(|| async { AxumStatus::NOT_FOUND }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let http = Client::new();
        let creds = Credentials::new("admin", "pw");
        let bytes = fetch_snapshot(&http, "127.0.0.1", port, "/snap.jpg", Some(&creds))
            .await
            .unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);

        assert!(matches!(
            fetch_snapshot(&http, "127.0.0.1", port, "/snap.jpg", None).await,
            Err(ClientError::Status(401))
        ));
        assert!(matches!(
            fetch_snapshot(&http, "127.0.0.1", port, "/missing", Some(&creds)).await,
            Err(ClientError::Status(404))
        ));
    }
}
