use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::PersistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Code,
    Document,
    Chart,
    Image,
    Html,
    Svg,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Document => "document",
            Self::Chart => "chart",
            Self::Image => "image",
            Self::Html => "html",
            Self::Svg => "svg",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = PersistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "document" => Ok(Self::Document),
            "chart" => Ok(Self::Chart),
            "image" => Ok(Self::Image),
            "html" => Ok(Self::Html),
            "svg" => Ok(Self::Svg),
            _ => Err(PersistError::InvalidArtifactType(s.to_string())),
        }
    }
}

/// Attachment declared alongside a user message, before it is keyed to one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArtifact {
    pub title: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub language: Option<String>,
    pub content: String,
}

/// Structured attachment owned by a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub message_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub language: Option<String>,
    pub content: String,
    /// Lowercase hex SHA-256 of `content`
    pub content_hash: String,
    pub size_bytes: u64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(message_id: impl Into<String>, new: NewArtifact) -> Self {
        let content_hash = hex::encode(Sha256::digest(new.content.as_bytes()));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.into(),
            title: new.title,
            artifact_type: new.artifact_type,
            language: new.language,
            size_bytes: new.content.len() as u64,
            content: new.content,
            content_hash,
            is_public: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_artifact_type() {
        assert_eq!("code".parse::<ArtifactType>().unwrap(), ArtifactType::Code);
        assert_eq!(" SVG ".parse::<ArtifactType>().unwrap(), ArtifactType::Svg);
        match "spreadsheet".parse::<ArtifactType>() {
            Err(PersistError::InvalidArtifactType(t)) => assert_eq!(t, "spreadsheet"),
            other => panic!("Expected InvalidArtifactType, got {:?}", other),
        }
    }

    #[test]
    fn test_hash_and_size() {
        let artifact = Artifact::new(
            "m1",
            NewArtifact {
                title: "snippet".to_string(),
                artifact_type: ArtifactType::Code,
                language: Some("python".to_string()),
                content: "abc".to_string(),
            },
        );
        assert_eq!(
            artifact.content_hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(artifact.size_bytes, 3);
        assert_eq!(artifact.message_id, "m1");
        assert!(!artifact.is_public);
    }
}
