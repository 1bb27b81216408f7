//! The generation-service seam.
//!
//! The engine never produces content itself: a client hands its prompt to a
//! [`GenerationService`], and some time later a `Generation` message shows
//! up on the session log. How and where the content is produced is not the
//! engine's concern.

use crate::channel::{ChannelError, ClientChannel};
use crate::message::{ClientMessage, Envelope, Generation};
use crate::variant::{GenerationRequest, VariantKind};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The backend refused the prompt (filtered word, malformed input, ...).
    /// The display text is shown to the submitting player.
    #[error("prompt rejected: {reason}")]
    Rejected { reason: String },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Requests content for a prompt; completion appends a `Generation` message
/// to the session log.
pub trait GenerationService {
    fn request(&self, author: Uuid, request: &GenerationRequest) -> Result<(), GenerationError>;
}

/// Local generator for the demo binary and tests: fabricates content from
/// the prompt and appends the resulting message immediately.
pub struct EchoGenerator<C: ClientChannel> {
    channel: C,
}

impl<C: ClientChannel> EchoGenerator<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    fn fabricate(author: Uuid, request: &GenerationRequest) -> Generation {
        let mut generation = Generation {
            author,
            kind: request.kind,
            prompt: request.prompt.clone(),
            text: None,
            url: None,
            list_prefix: request.list_prefix.clone(),
        };
        match request.kind {
            VariantKind::Image => {
                let slug: String = request
                    .prompt
                    .chars()
                    .map(|c| if c.is_alphanumeric() { c } else { '-' })
                    .collect();
                generation.url = Some(format!("memory://images/{}", slug.to_lowercase()));
            }
            VariantKind::Text => {
                generation.text = Some(format!("{}, or so the story goes.", request.prompt));
            }
            VariantKind::List => {
                let lines: Vec<String> = (1..=5)
                    .map(|n| format!("{}. {} (take {})", n, request.prompt, n))
                    .collect();
                generation.text = Some(lines.join("\n"));
            }
        }
        generation
    }
}

impl<C: ClientChannel> GenerationService for EchoGenerator<C> {
    fn request(&self, author: Uuid, request: &GenerationRequest) -> Result<(), GenerationError> {
        if request.prompt.trim().is_empty() {
            return Err(GenerationError::Rejected {
                reason: "empty prompt".to_string(),
            });
        }
        let generation = Self::fabricate(author, request);
        let envelope = Envelope::new(author, ClientMessage::Generation(generation));
        self.channel.append_message(&envelope)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{HostChannel, InMemoryChannel};

    #[tokio::test]
    async fn test_echo_generator_enqueues_a_generation_message() {
        let channel = InMemoryChannel::new();
        let mut rx = HostChannel::subscribe_messages(&channel);
        let author = Uuid::new_v4();
        let generator = EchoGenerator::new(channel.clone());

        generator
            .request(
                author,
                &GenerationRequest {
                    kind: VariantKind::Text,
                    prompt: "a heron opens a bakery".to_string(),
                    list_prefix: None,
                },
            )
            .unwrap();

        let envelope = Envelope::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(envelope.sender, author);
        match envelope.body {
            ClientMessage::Generation(g) => {
                assert_eq!(g.author, author);
                assert_eq!(g.prompt, "a heron opens a bakery");
                assert!(g.text.unwrap().contains("a heron opens a bakery"));
            }
            other => panic!("expected a generation, got {:?}", other),
        }
    }

    #[test]
    fn test_image_generation_gets_an_url() {
        let request = GenerationRequest {
            kind: VariantKind::Image,
            prompt: "Dog Burrito".to_string(),
            list_prefix: None,
        };
        let generation = EchoGenerator::<InMemoryChannel>::fabricate(Uuid::new_v4(), &request);
        assert_eq!(generation.url.as_deref(), Some("memory://images/dog-burrito"));
        assert_eq!(generation.text, None);
    }

    #[test]
    fn test_list_generation_has_five_lines() {
        let request = GenerationRequest {
            kind: VariantKind::List,
            prompt: "nap in a hammock".to_string(),
            list_prefix: Some("List the top 5 best".to_string()),
        };
        let generation = EchoGenerator::<InMemoryChannel>::fabricate(Uuid::new_v4(), &request);
        assert_eq!(generation.text.unwrap().lines().count(), 5);
        assert_eq!(
            generation.list_prefix.as_deref(),
            Some("List the top 5 best")
        );
    }

    #[test]
    fn test_empty_prompt_is_rejected() {
        let channel = InMemoryChannel::new();
        let generator = EchoGenerator::new(channel.clone());
        let result = generator.request(
            Uuid::new_v4(),
            &GenerationRequest {
                kind: VariantKind::Text,
                prompt: "   ".to_string(),
                list_prefix: None,
            },
        );
        assert!(matches!(result, Err(GenerationError::Rejected { .. })));
        assert_eq!(channel.message_count(), 0);
    }
}
