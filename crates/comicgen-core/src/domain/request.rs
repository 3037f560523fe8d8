//! Request payloads sent to the comic service.
//!
//! Field names match the service's JSON (`target_audience`, `visual_style`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Humorous,
    Educational,
    Dramatic,
    Inspirational,
}

impl Tone {
    pub const ALL: [Tone; 4] = [
        Tone::Humorous,
        Tone::Educational,
        Tone::Dramatic,
        Tone::Inspirational,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Humorous => "humorous",
            Tone::Educational => "educational",
            Tone::Dramatic => "dramatic",
            Tone::Inspirational => "inspirational",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[default]
    General,
    Kids,
    Technical,
    Academic,
}

impl Audience {
    pub const ALL: [Audience; 4] = [
        Audience::General,
        Audience::Kids,
        Audience::Technical,
        Audience::Academic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Audience::General => "general",
            Audience::Kids => "kids",
            Audience::Technical => "technical",
            Audience::Academic => "academic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VisualStyle {
    #[default]
    #[serde(rename = "modern digital comic")]
    ModernDigitalComic,
    #[serde(rename = "classic comic book")]
    ClassicComicBook,
    #[serde(rename = "manga style")]
    Manga,
    #[serde(rename = "cartoon style")]
    Cartoon,
    #[serde(rename = "realistic illustration")]
    RealisticIllustration,
    #[serde(rename = "minimalist art")]
    Minimalist,
}

impl VisualStyle {
    pub const ALL: [VisualStyle; 6] = [
        VisualStyle::ModernDigitalComic,
        VisualStyle::ClassicComicBook,
        VisualStyle::Manga,
        VisualStyle::Cartoon,
        VisualStyle::RealisticIllustration,
        VisualStyle::Minimalist,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VisualStyle::ModernDigitalComic => "modern digital comic",
            VisualStyle::ClassicComicBook => "classic comic book",
            VisualStyle::Manga => "manga style",
            VisualStyle::Cartoon => "cartoon style",
            VisualStyle::RealisticIllustration => "realistic illustration",
            VisualStyle::Minimalist => "minimalist art",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for VisualStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; `-` and `_` are accepted in place of spaces so that
/// `manga-style` works on a command line.
fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace(['-', '_'], " ")
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Tone::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown tone '{s}'"))
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Audience::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| format!("unknown audience '{s}'"))
    }
}

impl FromStr for VisualStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        // "manga" alone is as good as "manga style"
        VisualStyle::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted || v.as_str().split(' ').next() == Some(wanted.as_str()))
            .ok_or_else(|| format!("unknown visual style '{s}'"))
    }
}

/// Single comic generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicRequest {
    pub topic: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub target_audience: Audience,
    #[serde(default)]
    pub visual_style: VisualStyle,
}

impl ComicRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            tone: Tone::default(),
            target_audience: Audience::default(),
            visual_style: VisualStyle::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topic.trim().is_empty() {
            return Err(ValidationError::EmptyTopic);
        }
        Ok(())
    }
}

/// Several comics in one background run on the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchComicRequest {
    pub topics: Vec<String>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub visual_style: VisualStyle,
}

impl BatchComicRequest {
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            tone: Tone::default(),
            visual_style: VisualStyle::default(),
        }
    }

    /// Topics that are not blank, in input order.
    pub fn valid_topics(&self) -> impl Iterator<Item = &String> {
        self.topics.iter().filter(|t| !t.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.valid_topics().next().is_none() {
            return Err(ValidationError::NoTopics);
        }
        Ok(())
    }

    /// Copy of the request with blank topics dropped; this is what goes on
    /// the wire.
    pub fn without_blank_topics(&self) -> Self {
        Self {
            topics: self.valid_topics().cloned().collect(),
            tone: self.tone,
            visual_style: self.visual_style,
        }
    }
}

/// Video generation for an existing comic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRequest {
    pub comic_id: String,
}

impl VideoRequest {
    pub fn new(comic_id: impl Into<String>) -> Self {
        Self {
            comic_id: comic_id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.comic_id.trim().is_empty() {
            return Err(ValidationError::EmptyComicId);
        }
        Ok(())
    }
}
