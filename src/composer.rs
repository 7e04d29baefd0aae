//! Reply composition
//!
//! Maps decoded messages and postbacks to outbound reply batches. Text is
//! routed through an ordered trigger table (first match wins); media messages
//! are stored through the [`MediaStore`] and echoed back by public URL.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::BotResult;
use crate::media_cache::{MediaKind, MediaStore};
use crate::types::{
    Column, ImagemapAction, ImagemapArea, ImagemapBaseSize, Message, ReplyMessage, Template,
    TemplateAction,
};

/// Duration reported for echoed audio when the inbound message carries none
pub const DEFAULT_AUDIO_DURATION_MS: u64 = 60_000;

const EXPLODING_KITTENS_URL: &str = "http://www.explodingkittens.com/";
const GREETING_STICKER: (&str, &str) = ("2", "144");
const COWARD_STICKER: (&str, &str) = ("2", "527");

/// Canned conversational flow selected by a trigger phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Imagemap,
    Goodbye,
    ConfirmExplode,
    FindZombie,
    MultiZombie,
}

/// Trigger phrases in priority order, matched against lower-cased text
pub const TRIGGERS: &[(&str, Intent)] = &[
    ("imagemap", Intent::Imagemap),
    ("goodbye", Intent::Goodbye),
    ("i want to explode", Intent::ConfirmExplode),
    ("find zombie", Intent::FindZombie),
    ("multizombie", Intent::MultiZombie),
];

/// First intent whose phrase occurs in `text`
pub fn match_intent(text: &str) -> Option<Intent> {
    let lowered = text.to_lowercase();
    TRIGGERS
        .iter()
        .find(|(phrase, _)| lowered.contains(phrase))
        .map(|(_, intent)| *intent)
}

/// What the bot should do in response to one inbound message or postback
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// Send these messages as one reply batch
    Reply(Vec<ReplyMessage>),
    /// Leave the group or room the event came from
    LeaveChat,
    /// Nothing to send; the reason is logged
    Unhandled(String),
}

/// Builds reply batches for inbound messages and postbacks
pub struct Composer {
    media: Arc<dyn MediaStore>,
    media_base_url: String,
    rng: Mutex<StdRng>,
}

impl Composer {
    /// `media_base_url` is the public URL the media directory is served under
    pub fn new(media: Arc<dyn MediaStore>, media_base_url: impl Into<String>) -> Self {
        Self::with_rng(media, media_base_url, StdRng::from_entropy())
    }

    /// Composer with a deterministic random source
    pub fn with_seed(media: Arc<dyn MediaStore>, media_base_url: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(media, media_base_url, StdRng::seed_from_u64(seed))
    }

    fn with_rng(media: Arc<dyn MediaStore>, media_base_url: impl Into<String>, rng: StdRng) -> Self {
        Self {
            media,
            media_base_url: media_base_url.into().trim_end_matches('/').to_string(),
            rng: Mutex::new(rng),
        }
    }

    fn media_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.media_base_url, file_name)
    }

    fn static_url(&self, file_name: &str) -> String {
        format!("{}/static/{}", self.media_base_url, file_name)
    }

    /// Compose the reaction to a message event
    ///
    /// Image, video and audio content is downloaded first; store errors
    /// propagate unchanged.
    pub async fn compose(&self, message: &Message) -> BotResult<Reaction> {
        debug!("Composing reply for {} message", message.kind());

        let reaction = match message {
            Message::Text { text, .. } => self.compose_text(text)?,
            Message::Image { id } => {
                let name = self.media.fetch(MediaKind::Image, id).await?;
                let preview = self.media.derive_preview(&name).await?;
                Reaction::Reply(vec![ReplyMessage::image(
                    self.media_url(&name),
                    self.media_url(&preview),
                )])
            }
            Message::Video { id } => {
                let name = self.media.fetch(MediaKind::Video, id).await?;
                Reaction::Reply(vec![ReplyMessage::Video {
                    original_content_url: self.media_url(&name),
                    preview_image_url: self.static_url("zombiemessage.jpg"),
                }])
            }
            Message::Audio { id, duration } => {
                let name = self.media.fetch(MediaKind::Audio, id).await?;
                Reaction::Reply(vec![ReplyMessage::Audio {
                    original_content_url: self.media_url(&name),
                    duration: duration.unwrap_or(DEFAULT_AUDIO_DURATION_MS),
                }])
            }
            Message::Sticker {
                package_id,
                sticker_id,
                ..
            } => Reaction::Reply(vec![ReplyMessage::sticker(package_id, sticker_id)]),
            Message::Location {
                title,
                address,
                latitude,
                longitude,
                ..
            } => Reaction::Reply(vec![ReplyMessage::Location {
                title: title.clone().unwrap_or_else(|| "Location".to_string()),
                address: address.clone().unwrap_or_else(|| "Unknown address".to_string()),
                latitude: *latitude,
                longitude: *longitude,
            }]),
            Message::Unsupported => Reaction::Unhandled("unsupported message type".to_string()),
        };
        Ok(reaction)
    }

    /// Route text through the trigger table; unmatched text is echoed
    pub fn compose_text(&self, text: &str) -> BotResult<Reaction> {
        let Some(intent) = match_intent(text) else {
            if text.trim().is_empty() {
                return Ok(Reaction::Unhandled("empty text message".to_string()));
            }
            return Ok(Reaction::Reply(vec![ReplyMessage::text(text)]));
        };

        debug!("Text matched trigger {:?}", intent);
        let message = match intent {
            Intent::Goodbye => return Ok(Reaction::LeaveChat),
            Intent::Imagemap => self.imagemap(),
            Intent::ConfirmExplode => self.confirm_explode(),
            Intent::FindZombie => self.find_zombie()?,
            Intent::MultiZombie => self.multizombie()?,
        };
        Ok(Reaction::Reply(vec![message]))
    }

    /// Answer a postback token from an earlier template action
    pub fn compose_postback(&self, data: &str) -> Reaction {
        match data {
            "run" => {
                let escaped = self.rng.lock().gen_bool(0.5);
                let (text, image) = if escaped {
                    (
                        "I got your run postback... and your were able to escape!!",
                        "run.jpg",
                    )
                } else {
                    (
                        "I got your run postback... and the zombie got you! Now you must EXPLODE!",
                        "explode.jpg",
                    )
                };
                Reaction::Reply(vec![
                    ReplyMessage::text(text),
                    ReplyMessage::image(
                        self.static_url(image),
                        self.static_url(&format!("p_{}", image)),
                    ),
                ])
            }
            "noexplode" => Reaction::Reply(vec![
                ReplyMessage::text(
                    "I got a postback saying that you do not want to explode... and I think you are a coward!",
                ),
                ReplyMessage::sticker(COWARD_STICKER.0, COWARD_STICKER.1),
            ]),
            other => Reaction::Unhandled(format!("unrecognized postback data '{}'", other)),
        }
    }

    /// Greeting sent to a user who added the bot as a friend
    pub fn follow_greeting(display_name: &str) -> Vec<ReplyMessage> {
        vec![
            ReplyMessage::text(format!("Hi, {}!!", display_name)),
            ReplyMessage::text("Thank you for being my friend!"),
            ReplyMessage::sticker(GREETING_STICKER.0, GREETING_STICKER.1),
        ]
    }

    /// Greeting sent when the bot joins a group or room
    pub fn join_greeting() -> Vec<ReplyMessage> {
        vec![
            ReplyMessage::text("Hello everybody!"),
            ReplyMessage::text("Thank you for inviting me to this group!"),
            ReplyMessage::sticker(GREETING_STICKER.0, GREETING_STICKER.1),
        ]
    }

    // =========================================================================
    // Canned flows
    // =========================================================================

    fn imagemap(&self) -> ReplyMessage {
        ReplyMessage::Imagemap {
            base_url: self.media_url("imagemap"),
            alt_text: "This is an imagemap".to_string(),
            base_size: ImagemapBaseSize {
                width: 1040,
                height: 636,
            },
            actions: vec![
                ImagemapAction::Uri {
                    link_uri: EXPLODING_KITTENS_URL.to_string(),
                    area: ImagemapArea {
                        x: 47,
                        y: 54,
                        width: 293,
                        height: 528,
                    },
                },
                ImagemapAction::Message {
                    text: "ZOMBIES!!".to_string(),
                    area: ImagemapArea {
                        x: 549,
                        y: 49,
                        width: 293,
                        height: 528,
                    },
                },
            ],
        }
    }

    fn confirm_explode(&self) -> ReplyMessage {
        let template = Template::confirm(
            "Are you SURE you want to explode?",
            [
                TemplateAction::uri("YES!", self.static_url("explode.jpg")),
                TemplateAction::postback("NO!", "noexplode"),
            ],
        );
        ReplyMessage::template("This is a confirm template", template)
    }

    fn find_zombie(&self) -> BotResult<ReplyMessage> {
        let template = Template::buttons(
            Some("You have encountered a ZOMBIE!!".to_string()),
            Some(self.static_url("zombiemessage.jpg")),
            "What do you do?!?",
            vec![
                TemplateAction::postback("Run!", "run").with_text("I'm outta here!!"),
                TemplateAction::message("Scream!", "AHHHHHH!"),
                TemplateAction::uri("EXPLODE!", self.static_url("explode.jpg")),
            ],
        )?;
        Ok(ReplyMessage::template("This is a buttons template", template))
    }

    fn multizombie(&self) -> BotResult<ReplyMessage> {
        let thumbnail = Some(self.static_url("zombiemessage.jpg"));
        let explode = self.static_url("explode.jpg");

        let columns = vec![
            Column {
                thumbnail_image_url: thumbnail.clone(),
                title: Some("Zombie #1".to_string()),
                text: "A slow zombie shambles toward you".to_string(),
                actions: vec![
                    TemplateAction::postback("Run!", "run").with_text("I'm outta here!!"),
                    TemplateAction::uri("EXPLODE!", explode.clone()),
                ],
            },
            Column {
                thumbnail_image_url: thumbnail.clone(),
                title: Some("Zombie #2".to_string()),
                text: "A zombie is eating your lunch".to_string(),
                actions: vec![
                    TemplateAction::message("Scream!", "AHHHHHH!"),
                    TemplateAction::postback("Run!", "run").with_text("I'm outta here!!"),
                ],
            },
            Column {
                thumbnail_image_url: thumbnail,
                title: Some("Zombie #3".to_string()),
                text: "A zombie wants to be your friend".to_string(),
                actions: vec![
                    TemplateAction::message("Befriend", "Hi, zombie!"),
                    TemplateAction::uri("EXPLODE!", explode),
                ],
            },
        ];

        Ok(ReplyMessage::template(
            "This is a carousel template",
            Template::carousel(columns)?,
        ))
    }
}
