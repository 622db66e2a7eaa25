//! Entity types: prompts, resources, and tools.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SmcpError;

/// The three entity kinds stored by smcp.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Prompt,
    Resource,
    Tool,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Prompt, Self::Resource, Self::Tool];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Resource => "resource",
            Self::Tool => "tool",
        }
    }

    /// Whether entities of this kind live in the vector index.
    ///
    /// Prompts are never embedded; they are found by keyword match.
    #[must_use]
    pub const fn is_embedded(self) -> bool {
        matches!(self, Self::Resource | Self::Tool)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = SmcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" | "prompts" => Ok(Self::Prompt),
            "resource" | "resources" => Ok(Self::Resource),
            "tool" | "tools" => Ok(Self::Tool),
            other => Err(SmcpError::InvalidInput(format!("unknown entity kind '{other}'"))),
        }
    }
}

/// Generate a fresh entity id of the form `<kind>_<8 hex chars>`.
#[must_use]
pub fn new_entity_id(kind: EntityKind) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", kind.as_str(), &hex[..8])
}

/// Text handed to the embedder for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddableItem {
    pub kind: EntityKind,
    pub entity_id: String,
    pub text: String,
}

/// Join the non-empty parts of an entity into its embeddable text.
fn join_parts(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

// === Prompt ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl PromptRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for PromptRole {
    type Err = SmcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(SmcpError::InvalidInput(format!(
                "invalid prompt role '{other}': expected system, user, or assistant"
            ))),
        }
    }
}

/// A reusable prompt template. Never embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub name: String,
    pub role: PromptRole,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Prompt {
    /// Case-insensitive substring match over name, content, and tags.
    ///
    /// `needle` must already be lowercased.
    #[must_use]
    pub fn matches_keyword(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.content.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PromptCreate {
    /// Display name of the prompt
    pub name: String,
    /// Chat role: system, user, or assistant
    pub role: PromptRole,
    /// Prompt text
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PromptUpdate {
    pub name: Option<String>,
    pub role: Option<PromptRole>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl PromptUpdate {
    pub fn apply(self, prompt: &mut Prompt) {
        if let Some(name) = self.name {
            prompt.name = name;
        }
        if let Some(role) = self.role {
            prompt.role = role;
        }
        if let Some(content) = self.content {
            prompt.content = content;
        }
        if let Some(tags) = self.tags {
            prompt.tags = tags;
        }
    }
}

// === Resource ===

/// A piece of reference material (docs, snippets, notes). Embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub description: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    #[must_use]
    pub fn embeddable(&self) -> EmbeddableItem {
        let tags = self.tags.join(",");
        EmbeddableItem {
            kind: EntityKind::Resource,
            entity_id: self.id.clone(),
            text: join_parts(&[&self.name, &self.description, &self.content, &tags]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceCreate {
    pub name: String,
    pub description: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResourceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ResourceUpdate {
    pub fn apply(self, resource: &mut Resource) {
        if let Some(name) = self.name {
            resource.name = name;
        }
        if let Some(description) = self.description {
            resource.description = description;
        }
        if let Some(content) = self.content {
            resource.content = content;
        }
        if let Some(category) = self.category {
            resource.category = category;
        }
        if let Some(tags) = self.tags {
            resource.tags = tags;
        }
    }
}

// === Tool ===

/// An executable helper described by name, description, and code. Embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub code: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    #[must_use]
    pub fn embeddable(&self) -> EmbeddableItem {
        let tags = self.tags.join(",");
        EmbeddableItem {
            kind: EntityKind::Tool,
            entity_id: self.id.clone(),
            text: join_parts(&[&self.name, &self.description, &self.code, &tags]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolCreate {
    pub name: String,
    pub description: String,
    pub code: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ToolUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ToolUpdate {
    pub fn apply(self, tool: &mut Tool) {
        if let Some(name) = self.name {
            tool.name = name;
        }
        if let Some(description) = self.description {
            tool.description = description;
        }
        if let Some(code) = self.code {
            tool.code = code;
        }
        if let Some(tags) = self.tags {
            tool.tags = tags;
        }
    }
}

/// Any one of the three entity kinds, as returned in search hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityPayload {
    Prompt(Prompt),
    Resource(Resource),
    Tool(Tool),
}

impl EntityPayload {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Prompt(_) => EntityKind::Prompt,
            Self::Resource(_) => EntityKind::Resource,
            Self::Tool(_) => EntityKind::Tool,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Prompt(p) => &p.id,
            Self::Resource(r) => &r.id,
            Self::Tool(t) => &t.id,
        }
    }
}
