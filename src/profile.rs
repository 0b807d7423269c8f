//! Gesture and voice profiles: JSON mapping files parsed and validated at
//! load time, plus the lookup that turns stable events into descriptors.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::action::{
    ActionCommand, ActionDescriptor, ActionParams, ControllerKind, PointerButton,
};
use crate::classifier::GestureLabel;
use crate::landmarks::Handedness;
use crate::stabilizer::StableGestureEvent;

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    gestures: HashMap<String, MappingEntry>,
    #[serde(default)]
    voice: HashMap<String, MappingEntry>,
}

#[derive(Debug, Deserialize)]
struct MappingEntry {
    action: ControllerKind,
    command: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    required_confidence: f32,
    #[serde(default)]
    hand: Option<Handedness>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    description: String,
}

fn default_enabled() -> bool {
    true
}

/// A validated mapping: the command string already parsed.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub command: ActionCommand,
    pub enabled: bool,
    pub required_confidence: f32,
    pub hand: Option<Handedness>,
    pub confidence: f32,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub gestures: HashMap<String, Mapping>,
    pub voice: HashMap<String, Mapping>,
}

impl Profile {
    /// Parse and validate a profile file. Every command string must parse;
    /// a bad one fails the load naming the offending entry.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        let file: ProfileFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing profile {}", path.display()))?;
        let name = file
            .name
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unnamed".to_string())
            });

        let mut profile = Self::builtin(name);
        for (key, entry) in file.gestures {
            let mapping = validate(&key, entry)?;
            profile.gestures.insert(key, mapping);
        }
        for (phrase, entry) in file.voice {
            let mapping = validate(&phrase, entry)?;
            profile.voice.insert(clean_phrase(&phrase), mapping);
        }
        Ok(profile)
    }

    /// Pointer plumbing every profile gets for free: cursor, click, drag
    /// and scroll wired to the pointer controller. A profile entry under
    /// the same key overrides the builtin.
    pub fn builtin(name: String) -> Self {
        let mut gestures = HashMap::new();
        let mut add = |label: GestureLabel, command: ActionCommand, description: &str| {
            gestures.insert(
                label.name().to_string(),
                Mapping {
                    command,
                    enabled: true,
                    required_confidence: 0.0,
                    hand: None,
                    confidence: 1.0,
                    description: description.to_string(),
                },
            );
        };
        add(GestureLabel::Point, ActionCommand::PointerMove, "move cursor");
        add(
            GestureLabel::Click,
            ActionCommand::PointerClick(PointerButton::Left),
            "left click",
        );
        add(
            GestureLabel::RightClick,
            ActionCommand::PointerClick(PointerButton::Right),
            "right click",
        );
        add(
            GestureLabel::DragStart,
            ActionCommand::PointerPress(PointerButton::Left),
            "begin drag",
        );
        add(GestureLabel::DragMove, ActionCommand::PointerMove, "drag cursor");
        add(
            GestureLabel::DragEnd,
            ActionCommand::PointerRelease(PointerButton::Left),
            "end drag",
        );
        add(GestureLabel::ScrollStep, ActionCommand::PointerScroll, "scroll step");
        add(GestureLabel::ScrollMode, ActionCommand::PointerScroll, "scroll");
        Self {
            name,
            gestures,
            voice: HashMap::new(),
        }
    }
}

fn validate(key: &str, entry: MappingEntry) -> Result<Mapping> {
    let command = ActionCommand::parse(entry.action, &entry.command)
        .with_context(|| format!("mapping for {:?}", key))?;
    Ok(Mapping {
        command,
        enabled: entry.enabled,
        required_confidence: entry.required_confidence,
        hand: entry.hand,
        confidence: entry.confidence.unwrap_or(1.0),
        description: entry.description,
    })
}

pub struct ActionMapper {
    profile: Profile,
    next_id: AtomicU64,
}

impl ActionMapper {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            next_id: AtomicU64::new(1),
        }
    }

    /// Pure lookup: hand-specific key first, then hand-agnostic. Disabled
    /// mappings, wrong hand, or unmet confidence floor all map to nothing.
    pub fn map(&self, event: &StableGestureEvent) -> Option<ActionDescriptor> {
        let specific = format!("{}_{}", event.hand, event.label.name());
        let mapping = self
            .profile
            .gestures
            .get(&specific)
            .or_else(|| self.profile.gestures.get(event.label.name()))?;
        if !mapping.enabled {
            return None;
        }
        if let Some(hand) = mapping.hand {
            if hand != event.hand {
                return None;
            }
        }
        if event.confidence < mapping.required_confidence {
            return None;
        }
        Some(self.descriptor(mapping, event.confidence, ActionParams {
            cursor: event.cursor,
            scroll_delta: event.scroll_delta,
        }))
    }

    /// Resolve a transcribed phrase against the voice mappings using fuzzy
    /// matching, so "open the terminal" still hits "open terminal".
    pub fn map_voice(&self, text: &str) -> Option<ActionDescriptor> {
        let cleaned = clean_phrase(text);
        if cleaned.is_empty() {
            return None;
        }
        let mut best: Option<(f32, &Mapping)> = None;
        for (phrase, mapping) in &self.profile.voice {
            let score = phrase_similarity(&cleaned, phrase);
            if score >= 0.7 && best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, mapping));
            }
        }
        let (score, mapping) = best?;
        if !mapping.enabled {
            return None;
        }
        Some(self.descriptor(mapping, score, ActionParams::default()))
    }

    fn descriptor(
        &self,
        mapping: &Mapping,
        event_confidence: f32,
        params: ActionParams,
    ) -> ActionDescriptor {
        ActionDescriptor {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            command: mapping.command.clone(),
            params,
            description: mapping.description.clone(),
            confidence: event_confidence.min(mapping.confidence),
            profile: self.profile.name.clone(),
        }
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
fn clean_phrase(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity in 0..1. Exact and substring matches score highest; a heard
/// utterance that contains every word of the phrase still counts (speech
/// transcripts pad with filler words); otherwise edit distance decides.
fn phrase_similarity(heard: &str, phrase: &str) -> f32 {
    if heard == phrase {
        return 1.0;
    }
    if heard.contains(phrase) || phrase.contains(heard) {
        return 0.9;
    }
    let heard_words: Vec<&str> = heard.split_whitespace().collect();
    if phrase
        .split_whitespace()
        .all(|w| heard_words.contains(&w))
    {
        return 0.85;
    }
    let dist = levenshtein(heard, phrase);
    let max_len = heard.chars().count().max(phrase.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    1.0 - dist as f32 / max_len as f32
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}
