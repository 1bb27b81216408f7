//! Game-variant registry.
//!
//! One generic engine runs every variant; the differences (how a prompt is
//! turned into a generation request and how a finished generation is shown)
//! live in a small capability record selected here by kind.

use crate::message::Generation;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of content a session generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantKind {
    Image,
    Text,
    List,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VariantKind::Image => "image",
            VariantKind::Text => "text",
            VariantKind::List => "list",
        };
        write!(f, "{}", label)
    }
}

/// What the engine hands to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: VariantKind,
    pub prompt: String,
    pub list_prefix: Option<String>,
}

/// Per-variant capabilities; the engine itself is variant-agnostic.
pub struct VariantSpec {
    pub kind: VariantKind,
    pub display_name: &'static str,
    build_request: fn(&str, Option<&str>) -> GenerationRequest,
    render: fn(&Generation) -> String,
}

impl VariantSpec {
    pub fn build_request(&self, prompt: &str, list_prefix: Option<&str>) -> GenerationRequest {
        (self.build_request)(prompt, list_prefix)
    }

    /// Text form of a generation for the presentation layer.
    pub fn render_generation(&self, generation: &Generation) -> String {
        (self.render)(generation)
    }
}

impl fmt::Debug for VariantSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantSpec")
            .field("kind", &self.kind)
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Prompt stems for the list variant, re-rolled each writing phase.
pub const LIST_PREFIXES: [&str; 4] = [
    "List the top 5 best",
    "List the top 5 reasons you should",
    "List the top 5 most ridiculous ways to",
    "List the top 5 most obvious signs",
];

pub fn choose_list_prefix<R: Rng>(rng: &mut R) -> &'static str {
    // The table is non-empty, so choose cannot fail.
    LIST_PREFIXES.choose(rng).copied().unwrap_or(LIST_PREFIXES[0])
}

fn image_request(prompt: &str, _prefix: Option<&str>) -> GenerationRequest {
    GenerationRequest {
        kind: VariantKind::Image,
        prompt: prompt.to_string(),
        list_prefix: None,
    }
}

fn text_request(prompt: &str, _prefix: Option<&str>) -> GenerationRequest {
    GenerationRequest {
        kind: VariantKind::Text,
        prompt: prompt.to_string(),
        list_prefix: None,
    }
}

fn list_request(prompt: &str, prefix: Option<&str>) -> GenerationRequest {
    GenerationRequest {
        kind: VariantKind::List,
        prompt: prompt.to_string(),
        list_prefix: prefix.map(str::to_string),
    }
}

fn render_url(generation: &Generation) -> String {
    generation.url.clone().unwrap_or_default()
}

fn render_text(generation: &Generation) -> String {
    generation.text.clone().unwrap_or_default()
}

static REGISTRY: [VariantSpec; 3] = [
    VariantSpec {
        kind: VariantKind::Image,
        display_name: "Farsketched",
        build_request: image_request,
        render: render_url,
    },
    VariantSpec {
        kind: VariantKind::Text,
        display_name: "False Starts",
        build_request: text_request,
        render: render_text,
    },
    VariantSpec {
        kind: VariantKind::List,
        display_name: "Gisticle",
        build_request: list_request,
        render: render_text,
    },
];

/// Looks up the capability record for a variant kind.
pub fn variant_spec(kind: VariantKind) -> &'static VariantSpec {
    // The registry covers every kind by construction.
    REGISTRY
        .iter()
        .find(|spec| spec.kind == kind)
        .unwrap_or(&REGISTRY[0])
}
