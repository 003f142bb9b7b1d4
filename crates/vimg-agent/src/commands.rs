// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat command presets and the dispatcher that turns them into requests.

use std::str::FromStr;
use std::sync::Arc;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::debug;
use vimg_core::{CommandHandler, FailureKind, HostRequest, HostResponse, OriginId, ReferenceImage};

use crate::orchestrator::RequestOrchestrator;

const EDIT_DEFAULT_PROMPT: &str = "Beautify this image while keeping its main subject unchanged.";

const FIGURE_PROMPT: &str = "Please accurately transform the main subject in this image into a realistic, masterpiece-quality 1/7 scale PVC figure.

Specific Requirements:
1. **Figure Creation**: Convert the subject into a high-quality PVC figure with obvious three-dimensional depth and the characteristic glossy finish of PVC material
2. **Packaging Box Design**: Place an exquisite packaging box beside the figure. The front of the box should have a large transparent window displaying the original image, along with brand logos, product name, barcode, and detailed specification panels
3. **Display Base**: The figure should be placed on a round, transparent plastic base with visible thickness
4. **Background Setup**: Place a computer monitor in the background, with the screen displaying the ZBrush 3D modeling process of this figure
5. **Indoor Scene**: Set the entire scene in an indoor environment with appropriate lighting effects

Technical Requirements:
- Maintain the exact characteristics, expressions, and poses from the original image
- The figure must have obvious three-dimensional effects and must never appear flat
- PVC material texture should be clearly visible and realistic
- Avoid any cartoon outline strokes
- If the original image is not full-body, complete it as a full-body figure
- Character proportions should be natural and coordinated (head not too large, legs not too short)
- For animal figures, reduce fur realism to make it more statue-like rather than the real creature
- Pay attention to perspective relationships with near objects appearing larger and distant objects smaller
- No outer outline lines should be present

Please ensure the final result looks like a real commercial figure product that could exist in the market.";

const FIGURE2_PROMPT: &str = "将画面中的角色重塑为顶级收藏级树脂手办，全身动态姿势，置于角色主题底座，高精度材质，手工涂装，\
肌肤纹理与服装材质真实分明。戏剧性硬光为主光源，凸显立体感，无过曝；强效补光消除死黑，细节完整可见。\
背景为窗边景深模糊，侧后方隐约可见产品包装盒。博物馆级摄影质感，全身细节无损，面部结构精准。\
禁止：任何2D元素或照搬原图、塑料感、面部模糊、五官错位、细节丢失。";

const FIGURE3_PROMPT: &str = "Create a highly realistic 1/7 scale commercialized figure based on the illustration's adult character, \
ensuring the appearance and content are safe, healthy, and free from any inappropriate elements. \
Render the figure in a detailed, lifelike style and environment, placed on a shelf inside an ultra-realistic \
figure display cabinet, mounted on a circular transparent acrylic base without any text. Maintain highly precise \
details in texture, material, and paintwork to enhance realism. The cabinet scene should feature a natural depth \
of field with a smooth transition between foreground and background for a realistic photographic look. Lighting \
should appear natural and adaptive to the scene, automatically adjusting based on the overall composition instead \
of being locked to a specific direction, simulating the quality and reflection of real commercial photography. \
Other shelves in the cabinet should contain different figures which are slightly blurred due to being out of focus, \
enhancing spatial realism and depth.";

/// The chat commands vimg answers to.
///
/// Each command parses from its English name or its original Chinese alias,
/// with or without a leading `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ImageCommand {
    /// Text-to-image.
    #[strum(to_string = "imagine", serialize = "生图")]
    Imagine,
    /// Edit the attached images, optionally guided by a prompt.
    #[strum(to_string = "edit", serialize = "改图")]
    Edit,
    /// PVC figure with packaging box.
    #[strum(to_string = "figure", serialize = "手办化")]
    Figure,
    /// Collector-grade resin figure.
    #[strum(to_string = "figure2", serialize = "手办化2")]
    Figure2,
    /// 1/7 scale figure in a display cabinet.
    #[strum(to_string = "figure3", serialize = "手办化3")]
    Figure3,
    /// Lists the commands.
    #[strum(to_string = "imghelp", serialize = "img帮助")]
    Help,
}

impl ImageCommand {
    /// Parses a command word such as `/imagine` or `生图`.
    pub fn parse(word: &str) -> Option<Self> {
        Self::from_str(word.trim().trim_start_matches('/')).ok()
    }

    pub fn alias(self) -> &'static str {
        match self {
            Self::Imagine => "生图",
            Self::Edit => "改图",
            Self::Figure => "手办化",
            Self::Figure2 => "手办化2",
            Self::Figure3 => "手办化3",
            Self::Help => "img帮助",
        }
    }

    /// Fixed prompt that replaces any user text.
    pub fn preset_prompt(self) -> Option<&'static str> {
        match self {
            Self::Figure => Some(FIGURE_PROMPT),
            Self::Figure2 => Some(FIGURE2_PROMPT),
            Self::Figure3 => Some(FIGURE3_PROMPT),
            _ => None,
        }
    }

    pub fn requires_images(self) -> bool {
        matches!(self, Self::Edit | Self::Figure | Self::Figure2 | Self::Figure3)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Imagine => "<text>: generate an image from a description",
            Self::Edit => "+ image [text]: edit an existing image",
            Self::Figure => "+ image: turn the subject into a PVC figure",
            Self::Figure2 => "+ image: collector-grade resin figure",
            Self::Figure3 => "+ image: 1/7 scale figure in a display cabinet",
            Self::Help => ": list these commands",
        }
    }

    fn caption(self) -> Option<String> {
        match self {
            Self::Imagine | Self::Help => None,
            Self::Edit => Some("✨ Edit complete!".into()),
            Self::Figure | Self::Figure2 | Self::Figure3 => {
                Some(format!("✨ /{self} complete!"))
            }
        }
    }

    fn usage(self) -> String {
        match self {
            Self::Imagine => format!(
                "Please describe the image to generate, e.g. /{self} an orange cat sitting on a keyboard, cyberpunk style."
            ),
            _ => format!(
                "Please send an image, or reply to a message containing one, together with /{self}."
            ),
        }
    }
}

/// The command list shown by [`ImageCommand::Help`].
pub fn help_text() -> String {
    let mut lines = vec!["Image commands:".to_string()];
    for command in ImageCommand::iter() {
        lines.push(format!(
            "/{command} (/{}) {}",
            command.alias(),
            command.description()
        ));
    }
    lines.join("\n")
}

/// What a chat message turned into.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Run this request through the orchestrator.
    Request(HostRequest),
    /// Answer immediately without generating.
    Reply(HostResponse),
    /// Say nothing; the origin is filtered out or the text is not a command.
    Ignore,
}

/// Parses chat messages into orchestrator requests.
pub struct CommandDispatcher {
    orchestrator: Arc<RequestOrchestrator>,
}

impl CommandDispatcher {
    pub fn new(orchestrator: Arc<RequestOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<RequestOrchestrator> {
        &self.orchestrator
    }

    /// Maps a command with its arguments to a request or an immediate reply.
    ///
    /// `images` may be empty even when the user replied to an image; some
    /// chat adapters do not forward quoted media.
    pub fn dispatch(
        &self,
        command: ImageCommand,
        args: &str,
        images: Vec<ReferenceImage>,
        origin: Option<OriginId>,
    ) -> Dispatch {
        if command == ImageCommand::Help {
            if !self.orchestrator.is_allowed(origin.as_ref()) {
                return Dispatch::Ignore;
            }
            return Dispatch::Reply(HostResponse::Text(help_text()));
        }

        let text = collapse_whitespace(args);
        let prompt = match command {
            ImageCommand::Imagine => {
                if text.is_empty() {
                    return Dispatch::Reply(HostResponse::Text(command.usage()));
                }
                text
            }
            ImageCommand::Edit if text.is_empty() => EDIT_DEFAULT_PROMPT.to_string(),
            _ => command.preset_prompt().map(str::to_string).unwrap_or(text),
        };
        if command.requires_images() && images.is_empty() {
            return Dispatch::Reply(HostResponse::Text(command.usage()));
        }

        // Text-to-image ignores attachments.
        let images = if command == ImageCommand::Imagine {
            Vec::new()
        } else {
            images
        };
        debug!(command = %command, images = images.len(), "command dispatched");

        Dispatch::Request(HostRequest {
            origin,
            prompt,
            images,
            model: None,
            caption: command.caption(),
        })
    }

    /// Parses a whole message (`/command args...`) and runs it.
    ///
    /// Returns `None` when nothing should be posted back.
    pub async fn handle_message(
        &self,
        message: &str,
        images: Vec<ReferenceImage>,
        origin: Option<OriginId>,
    ) -> Option<HostResponse> {
        let trimmed = message.trim();
        let (word, args) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        let command = ImageCommand::parse(word)?;

        match self.dispatch(command, args, images, origin) {
            Dispatch::Request(request) => match self.orchestrator.handle(request).await {
                // Filtered origins get no reply at all.
                HostResponse::Failure {
                    kind: FailureKind::FilteredOut,
                    ..
                } => None,
                response => Some(response),
            },
            Dispatch::Reply(response) => Some(response),
            Dispatch::Ignore => None,
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
