//! Wire types for the LINE Messaging API webhook and reply endpoints

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{BotError, BotResult};

/// Maximum number of messages the platform accepts in one reply or push call
pub const MAX_BATCH_MESSAGES: usize = 5;

/// Maximum number of actions on a buttons template
pub const MAX_BUTTONS_ACTIONS: usize = 4;

/// Maximum number of columns on a carousel template
pub const MAX_CAROUSEL_COLUMNS: usize = 5;

/// Maximum number of actions on one carousel column
pub const MAX_COLUMN_ACTIONS: usize = 3;

// =============================================================================
// Inbound: webhook body and events
// =============================================================================

/// Top-level webhook request body
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    /// Bot user id the events were sent to
    #[serde(default)]
    pub destination: Option<String>,
    pub events: Vec<InboundEvent>,
}

/// One event from a webhook batch
///
/// `message` and `postback` stay raw until a handler decodes them against
/// the shape implied by `event_type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub message: Option<Box<RawValue>>,
    #[serde(default)]
    pub postback: Option<Box<RawValue>>,
}

/// Chat the event originated from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    #[serde(rename_all = "camelCase")]
    User {
        #[serde(default)]
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Group {
        #[serde(default)]
        group_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Room {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    #[default]
    #[serde(other)]
    Unknown,
}

impl Source {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Group { .. } => "group",
            Self::Room { .. } => "room",
            Self::Unknown => "unknown",
        }
    }

    /// Sending user, when the platform disclosed it
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User { user_id } if !user_id.is_empty() => Some(user_id.as_str()),
            Self::Group { user_id, .. } | Self::Room { user_id, .. } => user_id.as_deref(),
            _ => None,
        }
    }

    /// `(kind, id)` pair accepted by the leave endpoint, if the bot can leave this chat
    pub fn leave_target(&self) -> Option<(&'static str, &str)> {
        match self {
            Self::Group { group_id, .. } if !group_id.is_empty() => {
                Some(("group", group_id.as_str()))
            }
            Self::Room { room_id, .. } if !room_id.is_empty() => Some(("room", room_id.as_str())),
            _ => None,
        }
    }

    /// Id used for log lines
    pub fn chat_id(&self) -> &str {
        match self {
            Self::User { user_id } => user_id.as_str(),
            Self::Group { group_id, .. } => group_id.as_str(),
            Self::Room { room_id, .. } => room_id.as_str(),
            Self::Unknown => "unknown",
        }
    }
}

/// Message payload of a `message` event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text {
        #[serde(default)]
        id: String,
        text: String,
    },
    Image {
        #[serde(default)]
        id: String,
    },
    Video {
        #[serde(default)]
        id: String,
    },
    Audio {
        #[serde(default)]
        id: String,
        /// Length in milliseconds
        #[serde(default)]
        duration: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Sticker {
        #[serde(default)]
        id: String,
        package_id: String,
        sticker_id: String,
    },
    Location {
        #[serde(default)]
        id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        address: Option<String>,
        latitude: f64,
        longitude: f64,
    },
    /// Any message type this bot does not answer (file, etc.)
    #[serde(other)]
    Unsupported,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Audio { .. } => "audio",
            Self::Sticker { .. } => "sticker",
            Self::Location { .. } => "location",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Payload of a `postback` event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Postback {
    pub data: String,
}

/// User profile returned by the profile endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    pub user_id: String,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

// =============================================================================
// Outbound: reply messages
// =============================================================================

/// Message sent through the reply or push endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReplyMessage {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        original_content_url: String,
        preview_image_url: String,
    },
    #[serde(rename_all = "camelCase")]
    Video {
        original_content_url: String,
        preview_image_url: String,
    },
    #[serde(rename_all = "camelCase")]
    Audio {
        original_content_url: String,
        duration: u64,
    },
    #[serde(rename_all = "camelCase")]
    Sticker {
        package_id: String,
        sticker_id: String,
    },
    Location {
        title: String,
        address: String,
        latitude: f64,
        longitude: f64,
    },
    #[serde(rename_all = "camelCase")]
    Imagemap {
        base_url: String,
        alt_text: String,
        base_size: ImagemapBaseSize,
        actions: Vec<ImagemapAction>,
    },
    #[serde(rename_all = "camelCase")]
    Template { alt_text: String, template: Template },
}

impl ReplyMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn sticker(package_id: impl Into<String>, sticker_id: impl Into<String>) -> Self {
        Self::Sticker {
            package_id: package_id.into(),
            sticker_id: sticker_id.into(),
        }
    }

    pub fn image(original_content_url: impl Into<String>, preview_image_url: impl Into<String>) -> Self {
        Self::Image {
            original_content_url: original_content_url.into(),
            preview_image_url: preview_image_url.into(),
        }
    }

    pub fn template(alt_text: impl Into<String>, template: Template) -> Self {
        Self::Template {
            alt_text: alt_text.into(),
            template,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Audio { .. } => "audio",
            Self::Sticker { .. } => "sticker",
            Self::Location { .. } => "location",
            Self::Imagemap { .. } => "imagemap",
            Self::Template { .. } => "template",
        }
    }
}

/// Reference size of an imagemap image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagemapBaseSize {
    pub width: i32,
    pub height: i32,
}

/// Tappable rectangle on an imagemap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagemapArea {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Action bound to an imagemap area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImagemapAction {
    #[serde(rename_all = "camelCase")]
    Uri { link_uri: String, area: ImagemapArea },
    Message { text: String, area: ImagemapArea },
}

// =============================================================================
// Outbound: templates
// =============================================================================

/// Action presented on a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateAction {
    Postback {
        label: String,
        data: String,
        /// Text the user "says" when tapping the action
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Message {
        label: String,
        text: String,
    },
    Uri {
        label: String,
        uri: String,
    },
}

impl TemplateAction {
    pub fn postback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Postback {
            label: label.into(),
            data: data.into(),
            text: None,
        }
    }

    pub fn message(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            label: label.into(),
            text: text.into(),
        }
    }

    pub fn uri(label: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::Uri {
            label: label.into(),
            uri: uri.into(),
        }
    }

    /// Attach the text echoed into the chat when a postback action is tapped
    pub fn with_text(self, text: impl Into<String>) -> Self {
        match self {
            Self::Postback { label, data, .. } => Self::Postback {
                label,
                data,
                text: Some(text.into()),
            },
            other => other,
        }
    }
}

/// One carousel column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub actions: Vec<TemplateAction>,
}

/// Structured template message
///
/// Build through [`Template::buttons`], [`Template::confirm`] and
/// [`Template::carousel`], which enforce the action and column counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Template {
    #[serde(rename_all = "camelCase")]
    Buttons {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thumbnail_image_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        text: String,
        actions: Vec<TemplateAction>,
    },
    Confirm {
        text: String,
        actions: [TemplateAction; 2],
    },
    Carousel {
        columns: Vec<Column>,
    },
}

impl Template {
    /// Buttons template with 1 to 4 actions
    pub fn buttons(
        title: Option<String>,
        thumbnail_image_url: Option<String>,
        text: impl Into<String>,
        actions: Vec<TemplateAction>,
    ) -> BotResult<Self> {
        if actions.is_empty() || actions.len() > MAX_BUTTONS_ACTIONS {
            return Err(BotError::InvalidArgument(format!(
                "buttons template needs 1-{} actions, got {}",
                MAX_BUTTONS_ACTIONS,
                actions.len()
            )));
        }
        Ok(Self::Buttons {
            thumbnail_image_url,
            title,
            text: text.into(),
            actions,
        })
    }

    /// Confirm template; always exactly two actions
    pub fn confirm(text: impl Into<String>, actions: [TemplateAction; 2]) -> Self {
        Self::Confirm {
            text: text.into(),
            actions,
        }
    }

    /// Carousel template with 1 to 5 columns of 1 to 3 actions each
    pub fn carousel(columns: Vec<Column>) -> BotResult<Self> {
        if columns.is_empty() || columns.len() > MAX_CAROUSEL_COLUMNS {
            return Err(BotError::InvalidArgument(format!(
                "carousel template needs 1-{} columns, got {}",
                MAX_CAROUSEL_COLUMNS,
                columns.len()
            )));
        }
        if let Some((index, column)) = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.actions.is_empty() || c.actions.len() > MAX_COLUMN_ACTIONS)
        {
            return Err(BotError::InvalidArgument(format!(
                "carousel column {} needs 1-{} actions, got {}",
                index,
                MAX_COLUMN_ACTIONS,
                column.actions.len()
            )));
        }
        Ok(Self::Carousel { columns })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Buttons { .. } => "buttons",
            Self::Confirm { .. } => "confirm",
            Self::Carousel { .. } => "carousel",
        }
    }

    /// Actions shown directly on the template (carousels count per column)
    pub fn actions(&self) -> &[TemplateAction] {
        match self {
            Self::Buttons { actions, .. } => actions.as_slice(),
            Self::Confirm { actions, .. } => actions.as_slice(),
            Self::Carousel { .. } => &[],
        }
    }

    pub fn columns(&self) -> &[Column] {
        match self {
            Self::Carousel { columns } => columns.as_slice(),
            _ => &[],
        }
    }
}

// =============================================================================
// Outbound: request bodies
// =============================================================================

/// Body of the reply endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest<'a> {
    pub reply_token: &'a str,
    pub messages: &'a [ReplyMessage],
}

/// Body of the push endpoint
#[derive(Debug, Serialize)]
pub struct PushRequest<'a> {
    pub to: &'a str,
    pub messages: &'a [ReplyMessage],
}
