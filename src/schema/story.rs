/// Story graph: passages keyed by title, loaded from RON or built in code.
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A titled block of raw story text; one node of the story graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub title: String,
    #[serde(default)]
    pub tags: FxHashSet<String>,
    pub content: String,
}

impl Passage {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            tags: FxHashSet::default(),
            content: content.into(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// A parsed story: its passages plus the name of the format that reads them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub format: String,
    pub format_version: String,
    pub start: Option<String>,
    pub passages: HashMap<String, Passage>,
}

// RON file shape: passages as a list, keyed by title on load.
#[derive(Debug, Deserialize)]
struct RonStory {
    #[serde(default)]
    title: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    format_version: String,
    #[serde(default)]
    start: Option<String>,
    passages: Vec<Passage>,
}

impl Story {
    pub fn new(title: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            format: format.into(),
            ..Self::default()
        }
    }

    /// Adds a passage, replacing any passage with the same title.
    pub fn add_passage(&mut self, passage: Passage) {
        if self.passages.contains_key(&passage.title) {
            log::warn!("passage '{}' defined twice; keeping the later one", passage.title);
        }
        self.passages.insert(passage.title.clone(), passage);
    }

    pub fn with_passage(mut self, passage: Passage) -> Self {
        self.add_passage(passage);
        self
    }

    pub fn passage(&self, title: &str) -> Option<&Passage> {
        self.passages.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.passages.contains_key(title)
    }

    /// The declared start passage, else one titled `Start`.
    pub fn start_passage(&self) -> Option<&Passage> {
        match &self.start {
            Some(title) => self.passages.get(title),
            None => self.passages.get("Start"),
        }
    }

    /// Passage titles in sorted order.
    pub fn titles(&self) -> Vec<&str> {
        let mut titles: Vec<&str> = self.passages.keys().map(String::as_str).collect();
        titles.sort_unstable();
        titles
    }

    /// Load a story from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Story, StoryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a story from a RON string.
    pub fn parse_ron(input: &str) -> Result<Story, StoryError> {
        let raw: RonStory = ron::from_str(input)?;
        let mut story = Story {
            title: raw.title,
            format: raw.format,
            format_version: raw.format_version,
            start: raw.start,
            passages: HashMap::new(),
        };
        for passage in raw.passages {
            story.add_passage(passage);
        }
        Ok(story)
    }
}
