//! ONVIF SOAP client for a physical NVR
//!
//! Authentication is negotiated per call:
//! - WS-Security PasswordDigest first.
//! - On `NotAuthorized` the device clock is read and the call is retried once
//!   with the measured offset applied to the token's `Created`. The offset is
//!   kept for later calls on this instance.
//! - A `401` carrying `WWW-Authenticate: Digest` switches that endpoint to
//!   HTTP Digest.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use digest_auth::AuthContext;
use reqwest::header::{CONTENT_TYPE, DATE, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode};
use ws_security::{Credentials, TokenGenerator};

use crate::error::ClientError;
use crate::profiles::{extract_profiles, MediaProfile};
use crate::soap::{envelope, extract_xml_value, parse_device_time, parse_fault};

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

pub const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";

/// Media endpoint paths in the order they are tried
pub const MEDIA_SERVICE_PATHS: [&str; 3] = [
    "/onvif/device_service",
    "/onvif/media_service",
    "/onvif/services",
];

/// ONVIF client bound to one device
pub struct OnvifClient {
    http: Client,
    base_url: String,
    credentials: Option<Credentials>,
    /// Device clock minus ours, learned after a NotAuthorized
    clock_offset: Option<chrono::Duration>,
    /// `WWW-Authenticate` challenge per endpoint path that demanded Digest
    digest_challenges: HashMap<String, String>,
    media_path: Option<String>,
}

struct RawResponse {
    status: StatusCode,
    www_authenticate: Option<String>,
    body: String,
}

impl OnvifClient {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: format!("http://{}:{}", host, port),
            credentials,
            clock_offset: None,
            digest_challenges: HashMap::new(),
            media_path: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn clock_offset(&self) -> Option<chrono::Duration> {
        self.clock_offset
    }

    pub fn media_path(&self) -> Option<&str> {
        self.media_path.as_deref()
    }

    async fn post(
        &self,
        path: &str,
        envelope: String,
        authorization: Option<String>,
    ) -> Result<RawResponse, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope);
        if let Some(auth) = authorization {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let www_authenticate = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await?;
        Ok(RawResponse {
            status,
            www_authenticate,
            body,
        })
    }

    fn ws_security_envelope(&self, body: &str) -> String {
        let header = self.credentials.as_ref().map(|creds| {
            TokenGenerator::new(creds).header(self.clock_offset.unwrap_or_else(chrono::Duration::zero))
        });
        envelope(body, header.as_deref())
    }

    async fn post_digest(&self, path: &str, body: &str, challenge: &str) -> Result<RawResponse, ClientError> {
        let Some(creds) = self.credentials.as_ref() else {
            return Err(ClientError::NotAuthorized("device requires credentials".into()));
        };
        let envelope = envelope(body, None);
        let context = AuthContext::new_post(
            &creds.username,
            &creds.password,
            path,
            Some(envelope.as_bytes().to_vec()),
        );
        let mut prompt =
            digest_auth::parse(challenge).map_err(|e| ClientError::DigestAuth(e.to_string()))?;
        let authorization = prompt
            .respond(&context)
            .map_err(|e| ClientError::DigestAuth(e.to_string()))?
            .to_header_string();
        self.post(path, envelope, Some(authorization)).await
    }

    fn is_not_authorized(resp: &RawResponse) -> bool {
        if resp.status == StatusCode::UNAUTHORIZED {
            return true;
        }
        parse_fault(&resp.body).is_some_and(|f| f.is_not_authorized())
    }

    fn digest_challenge(resp: &RawResponse) -> Option<&str> {
        (resp.status == StatusCode::UNAUTHORIZED)
            .then_some(resp.www_authenticate.as_deref())
            .flatten()
            .filter(|h| h.trim_start().to_ascii_lowercase().starts_with("digest"))
    }

    fn into_result(resp: RawResponse) -> Result<String, ClientError> {
        if let Some(fault) = parse_fault(&resp.body) {
            if fault.is_not_authorized() {
                return Err(ClientError::NotAuthorized(fault.reason));
            }
            return Err(ClientError::Fault {
                code: fault.code,
                reason: fault.reason,
            });
        }
        if resp.status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::NotAuthorized(resp.status.to_string()));
        }
        if !resp.status.is_success() {
            return Err(ClientError::Status(resp.status.as_u16()));
        }
        Ok(resp.body)
    }

    /// Send one SOAP call, negotiating authentication as needed.
    pub async fn call(&mut self, path: &str, body: &str) -> Result<String, ClientError> {
        if let Some(challenge) = self.digest_challenges.get(path).cloned() {
            let resp = self.post_digest(path, body, &challenge).await?;
            return Self::into_result(resp);
        }

        let resp = self.post(path, self.ws_security_envelope(body), None).await?;

        if let Some(challenge) = Self::digest_challenge(&resp).map(str::to_string) {
            tracing::debug!("{}{} requested HTTP Digest", self.base_url, path);
            let resp = self.post_digest(path, body, &challenge).await?;
            if resp.status.is_success() {
                self.digest_challenges.insert(path.to_string(), challenge);
            }
            return Self::into_result(resp);
        }

        if Self::is_not_authorized(&resp) && self.credentials.is_some() {
            match self.measure_clock_offset().await {
                Ok(offset) => {
                    tracing::info!(
                        "{} clock differs by {}s, retrying with offset",
                        self.base_url,
                        offset.num_seconds()
                    );
                    self.clock_offset = Some(offset);
                    let resp = self.post(path, self.ws_security_envelope(body), None).await?;
                    return Self::into_result(resp);
                }
                Err(e) => tracing::debug!("Could not read device clock: {}", e),
            }
        }

        Self::into_result(resp)
    }

    /// Device clock minus local clock
    async fn measure_clock_offset(&self) -> Result<chrono::Duration, ClientError> {
        let device_time = match self.get_system_date_and_time().await {
            Ok(t) => t,
            Err(_) => self.http_date().await?,
        };
        Ok(device_time.signed_duration_since(Utc::now()))
    }

    /// GetSystemDateAndTime, sent without credentials
    pub async fn get_system_date_and_time(&self) -> Result<DateTime<Utc>, ClientError> {
        let body = r#"<tds:GetSystemDateAndTime/>"#;
        let resp = self
            .post(DEVICE_SERVICE_PATH, envelope(body, None), None)
            .await?;
        let xml = Self::into_result(resp)?;
        parse_device_time(&xml).ok_or(ClientError::MissingElement("UTCDateTime"))
    }

    /// Device time from the HTTP `Date` header
    async fn http_date(&self) -> Result<DateTime<Utc>, ClientError> {
        let resp = self.http.head(format!("{}/", self.base_url)).send().await?;
        resp.headers()
            .get(DATE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or(ClientError::NoDeviceTime)
    }

    /// Media call across the known endpoint paths; the first that answers is
    /// remembered.
    async fn media_call(&mut self, body: &str) -> Result<String, ClientError> {
        if let Some(path) = self.media_path.clone() {
            return self.call(&path, body).await;
        }

        let mut first_err = None;
        for path in MEDIA_SERVICE_PATHS {
            match self.call(path, body).await {
                Ok(xml) => {
                    tracing::debug!("Using media endpoint {}{}", self.base_url, path);
                    self.media_path = Some(path.to_string());
                    return Ok(xml);
                }
                Err(e) if e.is_endpoint_miss() => {
                    tracing::debug!("Media endpoint {} failed: {}", path, e);
                    first_err.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(first_err.unwrap_or(ClientError::Status(404)))
    }

    pub async fn get_profiles(&mut self) -> Result<Vec<MediaProfile>, ClientError> {
        let xml = self.media_call("<trt:GetProfiles/>").await?;
        Ok(extract_profiles(&xml))
    }

    pub async fn get_stream_uri(&mut self, profile_token: &str) -> Result<String, ClientError> {
        let body = format!(
            r#"<trt:GetStreamUri>
      <trt:StreamSetup>
        <tt:Stream>RTP-Unicast</tt:Stream>
        <tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport>
      </trt:StreamSetup>
      <trt:ProfileToken>{}</trt:ProfileToken>
    </trt:GetStreamUri>"#,
            quick_xml::escape::escape(profile_token)
        );
        let xml = self.media_call(&body).await?;
        extract_xml_value(&xml, "Uri")
            .filter(|u| !u.is_empty())
            .ok_or(ClientError::MissingElement("Uri"))
    }

    pub async fn get_snapshot_uri(&mut self, profile_token: &str) -> Result<String, ClientError> {
        let body = format!(
            "<trt:GetSnapshotUri><trt:ProfileToken>{}</trt:ProfileToken></trt:GetSnapshotUri>",
            quick_xml::escape::escape(profile_token)
        );
        let xml = self.media_call(&body).await?;
        extract_xml_value(&xml, "Uri")
            .filter(|u| !u.is_empty())
            .ok_or(ClientError::MissingElement("Uri"))
    }
}
