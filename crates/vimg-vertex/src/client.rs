// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Vertex AI `generateContent` API.
//!
//! Provides [`VertexClient`], which performs one classified attempt at a time.
//! Retrying is the caller's decision; see [`crate::GenerationClient`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use vimg_core::{FailureKind, GenerationFailure, GenerationRequest, VimgError};

use crate::codec;
use crate::keys::ApiKeyRing;
use crate::types::{
    ApiErrorResponse, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    IMAGE_INSTRUCTION, Part,
};

/// Response bodies are cut to this many characters before they are logged.
const LOGGED_BODY_LIMIT: usize = 500;

/// Image bytes extracted from a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// HTTP client for Vertex AI image generation.
///
/// Cheap to clone; clones share the connection pool and the key ring.
#[derive(Debug, Clone)]
pub struct VertexClient {
    http: reqwest::Client,
    keys: Arc<ApiKeyRing>,
    base_url: String,
    generation_config: GenerationConfig,
    attempt_timeout: Duration,
}

impl VertexClient {
    /// Creates a client.
    ///
    /// `base_url` is the publisher models endpoint; `/{model}:generateContent`
    /// is appended per request. `attempt_timeout` bounds each attempt,
    /// including reading the body and downloading a linked image.
    pub fn new(
        keys: ApiKeyRing,
        base_url: impl Into<String>,
        generation_config: GenerationConfig,
        attempt_timeout: Duration,
    ) -> Result<Self, VimgError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| VimgError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            keys: Arc::new(keys),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            generation_config,
            attempt_timeout,
        })
    }

    pub fn keys(&self) -> &ApiKeyRing {
        &self.keys
    }

    pub fn generation_config(&self) -> GenerationConfig {
        self.generation_config
    }

    /// Full endpoint URL for `model`.
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/{model}:generateContent", self.base_url)
    }

    /// Runs one attempt and classifies its outcome.
    ///
    /// A failure that could be specific to the key in use rotates the ring.
    pub async fn attempt(
        &self,
        body: &GenerateContentRequest,
        model: &str,
    ) -> Result<DecodedImage, GenerationFailure> {
        let lease = self.keys.current();

        let outcome = match tokio::time::timeout(
            self.attempt_timeout,
            self.send(body, model, lease.key()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationFailure::new(
                FailureKind::Timeout,
                format!("attempt exceeded {:?}", self.attempt_timeout),
            )),
        };

        if let Err(failure) = &outcome {
            if matches!(failure.kind, FailureKind::ApiError | FailureKind::Timeout) {
                debug!(key_index = lease.index(), "rotating API key after failed attempt");
                self.keys.rotate_past(lease);
            }
        }
        outcome
    }

    async fn send(
        &self,
        body: &GenerateContentRequest,
        model: &str,
        api_key: &str,
    ) -> Result<DecodedImage, GenerationFailure> {
        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_failure)?;
        debug!(status = %status, bytes = text.len(), "generateContent response received");

        if !status.is_success() {
            let detail = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(api_err) => format!(
                    "Vertex AI error ({}): {}",
                    api_err.error.status.as_deref().unwrap_or("UNKNOWN"),
                    api_err.error.message
                ),
                Err(_) => format!("API returned {status}"),
            };
            warn!(status = %status, body = %truncate(&text, LOGGED_BODY_LIMIT), "generateContent failed");
            return Err(GenerationFailure::new(FailureKind::ApiError, detail));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %truncate(&text, LOGGED_BODY_LIMIT), "malformed generateContent response");
            GenerationFailure::new(FailureKind::ApiError, format!("malformed response: {e}"))
        })?;

        match locate_image(parsed.first_parts()) {
            Some(ImageSource::Inline { mime_type, data }) => decode_payload(data, Some(mime_type)),
            Some(ImageSource::DataUrl { mime_type, payload }) => {
                decode_payload(payload, Some(mime_type))
            }
            Some(ImageSource::Link(url)) => self.download(url).await,
            None => match parsed.safety_block() {
                Some(reason) => Err(GenerationFailure::new(FailureKind::SafetyBlocked, reason)),
                None => {
                    warn!(body = %truncate(&text, LOGGED_BODY_LIMIT), "no image in generateContent response");
                    Err(GenerationFailure::new(
                        FailureKind::ApiError,
                        "no image in response",
                    ))
                }
            },
        }
    }

    async fn download(&self, url: &str) -> Result<DecodedImage, GenerationFailure> {
        debug!(url, "downloading linked image");
        let response = self.http.get(url).send().await.map_err(transport_failure)?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationFailure::new(
                FailureKind::ApiError,
                format!("image download returned {status}"),
            ));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(transport_failure)?;
        if bytes.is_empty() {
            return Err(GenerationFailure::new(
                FailureKind::ApiError,
                "image download returned an empty body",
            ));
        }
        Ok(DecodedImage {
            mime_type: codec::resolve_mime(content_type.as_deref(), &bytes),
            bytes: bytes.to_vec(),
        })
    }
}

/// Builds the request body for `request`.
///
/// The first part carries the fixed instruction followed by the prompt; each
/// reference image follows as an inline part in order.
pub fn build_request(
    request: &GenerationRequest,
    generation_config: GenerationConfig,
) -> GenerateContentRequest {
    let prompt = request.prompt().trim();
    let instruction = if prompt.is_empty() {
        IMAGE_INSTRUCTION.to_string()
    } else {
        format!("{IMAGE_INSTRUCTION}\n\n{prompt}")
    };

    let mut parts = Vec::with_capacity(request.reference_images().len() + 1);
    parts.push(Part::text(instruction));
    parts.extend(
        request
            .reference_images()
            .iter()
            .map(|image| Part::inline(image.mime_type.clone(), codec::encode(&image.data))),
    );

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config,
    }
}

/// Where the image lives in a response.
#[derive(Debug, PartialEq, Eq)]
enum ImageSource<'a> {
    Inline { mime_type: &'a str, data: &'a str },
    DataUrl { mime_type: &'a str, payload: &'a str },
    Link(&'a str),
}

/// Inline data wins over a data URL in text, which wins over a plain link.
fn locate_image(parts: &[Part]) -> Option<ImageSource<'_>> {
    if let Some(inline) = parts.iter().find_map(|p| p.inline_data.as_ref()) {
        return Some(ImageSource::Inline {
            mime_type: &inline.mime_type,
            data: &inline.data,
        });
    }
    let texts = || parts.iter().filter_map(|p| p.text.as_deref());
    if let Some(url) = texts().find_map(codec::find_image_data_url) {
        return Some(ImageSource::DataUrl {
            mime_type: url.mime_type,
            payload: url.payload,
        });
    }
    texts().find_map(codec::find_http_url).map(ImageSource::Link)
}

fn decode_payload(text: &str, declared: Option<&str>) -> Result<DecodedImage, GenerationFailure> {
    let bytes = codec::decode(text)
        .map_err(|e| GenerationFailure::new(FailureKind::DecodeError, e.to_string()))?;
    if bytes.is_empty() {
        return Err(GenerationFailure::new(
            FailureKind::DecodeError,
            "image payload is empty",
        ));
    }
    Ok(DecodedImage {
        mime_type: codec::resolve_mime(declared, &bytes),
        bytes,
    })
}

fn transport_failure(e: reqwest::Error) -> GenerationFailure {
    let kind = if e.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::ApiError
    };
    GenerationFailure::new(kind, format!("HTTP request failed: {e}"))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vimg_core::ReferenceImage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "test-image-model";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn endpoint_path() -> String {
        format!("/{MODEL}:generateContent")
    }

    fn test_client(base_url: &str, keys: &[&str], timeout: Duration) -> VertexClient {
        VertexClient::new(
            ApiKeyRing::new(keys.iter().copied()).unwrap(),
            base_url,
            GenerationConfig::default(),
            timeout,
        )
        .unwrap()
    }

    fn test_body() -> GenerateContentRequest {
        let request = GenerationRequest::new("a red fox", vec![], MODEL, None).unwrap();
        build_request(&request, GenerationConfig::default())
    }

    fn inline_response(data: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"inlineData": {"mimeType": "image/png", "data": data}}
                ]},
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn build_request_prefixes_instruction_and_encodes_images() {
        let request = GenerationRequest::new(
            "make it blue",
            vec![ReferenceImage::new(b"hello".to_vec(), "image/jpeg")],
            MODEL,
            None,
        )
        .unwrap();
        let body = build_request(&request, GenerationConfig::default());
        let parts = &body.contents[0].parts;
        assert_eq!(parts.len(), 2);
        let text = parts[0].text.as_deref().unwrap();
        assert!(text.starts_with(IMAGE_INSTRUCTION));
        assert!(text.ends_with("make it blue"));
        let inline = parts[1].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/jpeg");
        assert_eq!(inline.data, "aGVsbG8=");
    }

    #[test]
    fn build_request_with_empty_prompt_sends_instruction_only() {
        let request = GenerationRequest::new("  ", vec![], MODEL, None).unwrap();
        let body = build_request(&request, GenerationConfig::default());
        assert_eq!(body.contents[0].parts[0].text.as_deref(), Some(IMAGE_INSTRUCTION));
    }

    #[test]
    fn locate_prefers_inline_over_text() {
        let parts = vec![
            Part::text("see https://example.com/x.png"),
            Part::inline("image/png", "AAAA".into()),
        ];
        assert!(matches!(locate_image(&parts), Some(ImageSource::Inline { .. })));
    }

    #[test]
    fn locate_prefers_data_url_over_link() {
        let parts = vec![
            Part::text("mirror: https://example.com/x.png"),
            Part::text("data:image/png;base64,AAAA"),
        ];
        assert!(matches!(locate_image(&parts), Some(ImageSource::DataUrl { .. })));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[tokio::test]
    async fn attempt_decodes_inline_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .and(header("x-goog-api-key", "key-1"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"maxOutputTokens": 8192}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(inline_response(&codec::encode(PNG))))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["key-1"], Duration::from_secs(5));
        let image = client.attempt(&test_body(), MODEL).await.unwrap();
        assert_eq!(image.bytes, PNG);
        assert_eq!(image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn attempt_decodes_data_url_in_text() {
        let server = MockServer::start().await;
        let text = format!("Result: data:image/png;base64,{} done", codec::encode(PNG));
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": text}]}}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["k"], Duration::from_secs(5));
        let image = client.attempt(&test_body(), MODEL).await.unwrap();
        assert_eq!(image.bytes, PNG);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn api_error_body_is_logged_not_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 400, "message": "bad prompt", "status": "INVALID_ARGUMENT", "trace": "internal-trace-id"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["k"], Duration::from_secs(5));
        let failure = client.attempt(&test_body(), MODEL).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ApiError);
        assert_eq!(failure.message, "Vertex AI error (INVALID_ARGUMENT): bad prompt");
        assert!(logs_contain("generateContent failed"));
        assert!(logs_contain("internal-trace-id"));
    }

    #[tokio::test]
    async fn attempt_downloads_linked_image() {
        let server = MockServer::start().await;
        let link = format!("{}/files/out.png", server.uri());
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": format!("Image: {link}")}]}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/out.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG.to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["k"], Duration::from_secs(5));
        let image = client.attempt(&test_body(), MODEL).await.unwrap();
        assert_eq!(image.bytes, PNG);
        assert_eq!(image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn attempt_classifies_safety_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"finishReason": "IMAGE_SAFETY"}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["a", "b"], Duration::from_secs(5));
        let failure = client.attempt(&test_body(), MODEL).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::SafetyBlocked);
        assert_eq!(client.keys().current().key(), "a", "safety blocks do not rotate keys");
    }

    #[tokio::test]
    async fn attempt_classifies_http_error_and_rotates_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["a", "b"], Duration::from_secs(5));
        let failure = client.attempt(&test_body(), MODEL).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ApiError);
        assert!(failure.message.contains("RESOURCE_EXHAUSTED"), "got: {}", failure.message);
        assert_eq!(client.keys().current().key(), "b");
    }

    #[tokio::test]
    async fn attempt_classifies_bad_payload_as_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(inline_response("abcde")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["k"], Duration::from_secs(5));
        let failure = client.attempt(&test_body(), MODEL).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::DecodeError);
    }

    #[tokio::test]
    async fn attempt_without_image_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "I cannot draw that."}]}, "finishReason": "STOP"}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["k"], Duration::from_secs(5));
        let failure = client.attempt(&test_body(), MODEL).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ApiError);
        assert_eq!(failure.message, "no image in response");
    }

    #[tokio::test]
    async fn attempt_with_malformed_json_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["k"], Duration::from_secs(5));
        let failure = client.attempt(&test_body(), MODEL).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ApiError);
        assert!(failure.message.starts_with("malformed response"));
    }

    #[tokio::test]
    async fn attempt_past_deadline_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoint_path()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(inline_response(&codec::encode(PNG)))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), &["k"], Duration::from_millis(50));
        let failure = client.attempt(&test_body(), MODEL).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
    }
}
