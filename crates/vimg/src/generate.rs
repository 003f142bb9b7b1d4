// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vimg generate` command implementation.
//!
//! Runs one chat command through the production pipeline (filter, rate
//! limit, Vertex AI, delivery) and prints what the chat would receive.

use std::path::PathBuf;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use vimg_agent::{AgentRuntime, CommandDispatcher, Dispatch, ImageCommand, build_orchestrator};
use vimg_config::model::VimgConfig;
use vimg_core::{CommandHandler, HostResponse, OriginId, ReferenceImage, VimgError};
use vimg_vertex::codec::sniff_mime;

pub async fn run_generate(
    config: &VimgConfig,
    origin: Option<String>,
    image_paths: Vec<PathBuf>,
    command: &str,
    prompt: &str,
) -> Result<ExitCode, VimgError> {
    let command = ImageCommand::parse(command).ok_or_else(|| {
        VimgError::InvalidRequest(format!(
            "unknown command '{command}' (expected imagine, edit, figure, figure2, figure3 or imghelp)"
        ))
    })?;
    let images = read_images(&image_paths).await?;

    let orchestrator = build_orchestrator(config)?;
    let runtime = AgentRuntime::start(config, orchestrator, CancellationToken::new()).await?;
    let reply = execute(
        runtime.dispatcher(),
        command,
        prompt,
        images,
        origin.map(OriginId::from),
    )
    .await;
    runtime.shutdown().await;

    let rendered = render(reply.as_ref());
    for line in &rendered.stdout {
        println!("{line}");
    }
    for line in &rendered.stderr {
        eprintln!("{line}");
    }
    Ok(if rendered.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Loads reference images, sniffing the mime type from the content.
async fn read_images(paths: &[PathBuf]) -> Result<Vec<ReferenceImage>, VimgError> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| VimgError::storage(format!("failed to read image {}", path.display()), e))?;
        let mime = sniff_mime(&data).unwrap_or("image/png");
        debug!(path = %path.display(), mime, bytes = data.len(), "loaded reference image");
        images.push(ReferenceImage::new(data, mime));
    }
    Ok(images)
}

/// Dispatches one command; `None` means the chat would see nothing.
async fn execute(
    dispatcher: &CommandDispatcher,
    command: ImageCommand,
    prompt: &str,
    images: Vec<ReferenceImage>,
    origin: Option<OriginId>,
) -> Option<HostResponse> {
    match dispatcher.dispatch(command, prompt, images, origin) {
        Dispatch::Request(request) => Some(dispatcher.orchestrator().handle(request).await),
        Dispatch::Reply(response) => Some(response),
        Dispatch::Ignore => None,
    }
}

#[derive(Debug, Default)]
struct Rendered {
    stdout: Vec<String>,
    stderr: Vec<String>,
    success: bool,
}

fn render(reply: Option<&HostResponse>) -> Rendered {
    let mut out = Rendered::default();
    match reply {
        Some(HostResponse::Image {
            reply_path,
            caption,
            delivery_warning,
            ..
        }) => {
            out.stdout.push(reply_path.clone());
            if let Some(caption) = caption {
                out.stdout.push(caption.clone());
            }
            if let Some(warning) = delivery_warning {
                out.stderr.push(format!("warning: {warning}"));
            }
            out.success = true;
        }
        Some(HostResponse::Text(text)) => {
            out.stdout.push(text.clone());
            out.success = true;
        }
        Some(HostResponse::Failure { kind, message }) => {
            out.stderr.push(format!("{kind}: {message}"));
        }
        None => out.stderr.push("origin is filtered out; no reply".to_string()),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use vimg_core::{FailureKind, FilterMode};
    use vimg_test_utils::{TestHarness, fixtures};

    #[tokio::test]
    async fn read_images_sniffs_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.bin");
        std::fs::write(&path, fixtures::png_bytes()).unwrap();

        let images = read_images(&[path]).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn missing_image_file_is_a_storage_error() {
        let result = read_images(&[PathBuf::from("/nonexistent/ref.png")]).await;
        assert!(matches!(result, Err(VimgError::Storage { .. })));
    }

    #[tokio::test]
    async fn figure_without_images_prints_usage() {
        let harness = TestHarness::builder().build().await.unwrap();
        let reply = execute(&harness.dispatcher, ImageCommand::Figure, "", Vec::new(), None).await;
        let rendered = render(reply.as_ref());
        assert!(rendered.success);
        assert!(rendered.stdout[0].contains("/figure"));
        assert_eq!(harness.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn imagine_prints_reply_path() {
        let harness = TestHarness::builder().build().await.unwrap();
        let reply = execute(
            &harness.dispatcher,
            ImageCommand::Imagine,
            "a  lighthouse",
            Vec::new(),
            Some(OriginId::from("g")),
        )
        .await;
        let rendered = render(reply.as_ref());
        assert!(rendered.success);
        assert!(rendered.stderr.is_empty());
        assert!(std::path::Path::new(&rendered.stdout[0]).is_file());
        assert_eq!(harness.generator.last_request().await.unwrap().prompt(), "a lighthouse");
    }

    #[tokio::test]
    async fn filtered_origin_reports_on_stderr() {
        let harness = TestHarness::builder()
            .with_filter(FilterMode::Whitelist, ["allowed"])
            .build()
            .await
            .unwrap();
        let reply = execute(
            &harness.dispatcher,
            ImageCommand::Help,
            "",
            Vec::new(),
            Some(OriginId::from("other")),
        )
        .await;
        let rendered = render(reply.as_ref());
        assert!(!rendered.success);
        assert!(rendered.stdout.is_empty());
    }

    #[test]
    fn failure_renders_kind_and_message() {
        let reply = HostResponse::Failure {
            kind: FailureKind::SafetyBlocked,
            message: "blocked".into(),
        };
        let rendered = render(Some(&reply));
        assert!(!rendered.success);
        assert_eq!(rendered.stderr.len(), 1);
        assert!(rendered.stderr[0].ends_with("blocked"));
    }

    #[test]
    fn delivery_warning_goes_to_stderr() {
        let reply = HostResponse::Image {
            local_path: PathBuf::from("/tmp/a.png"),
            reply_path: "/tmp/a.png".into(),
            caption: Some("done".into()),
            delivery_warning: Some("peer unreachable".into()),
        };
        let rendered = render(Some(&reply));
        assert!(rendered.success);
        assert_eq!(rendered.stdout, ["/tmp/a.png", "done"]);
        assert_eq!(rendered.stderr, ["warning: peer unreachable"]);
    }
}
