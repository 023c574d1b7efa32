//! Regex entity extraction.
//!
//! Four passes over the turn text (files, classes, methods, UI elements),
//! then overlapping spans are resolved: file matches win, otherwise the
//! longer span wins.

use regex_lite::Regex;
use tiermind_core::{EntityKind, Error};

/// File extensions recognised as source files.
const FILE_EXTENSIONS: &[&str] = &[
    "razor", "cshtml", "cs", "rs", "tsx", "ts", "jsx", "js", "py", "go", "java", "kt", "swift",
    "rb", "php", "cpp", "cc", "hpp", "c", "h", "css", "scss", "html", "vue", "svelte", "json",
    "toml", "yaml", "yml", "xml", "sql", "md",
];

/// Nouns that name a UI element.
pub const UI_NOUNS: &[&str] = &[
    "button", "panel", "modal", "dialog", "menu", "dropdown", "tab", "form", "input",
    "checkbox", "toggle", "slider", "card", "navbar", "sidebar", "toolbar", "header", "footer",
    "icon", "link", "field", "banner", "tooltip", "badge",
];

/// Words that never qualify a UI noun ("a button", "the panel").
const QUALIFIER_STOPWORDS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "it", "to", "add", "new", "my", "your",
    "our", "their", "its", "of", "in", "on", "at", "for", "with", "and", "or", "some", "each",
    "every", "one", "make", "create", "remove", "delete", "update", "change",
];

/// An entity found in a piece of text, before it is tied to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMention {
    pub kind: EntityKind,
    pub text: String,
    pub reference: String,
    /// Byte offset in the source text
    pub offset: usize,
}

impl EntityMention {
    fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    fn overlaps(&self, other: &EntityMention) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Compiled extraction patterns.
#[derive(Debug)]
pub struct EntityExtractor {
    file: Regex,
    class: Regex,
    call: Regex,
    named_method: Regex,
    ui: Regex,
}

impl EntityExtractor {
    pub fn new() -> Result<Self, Error> {
        let file = format!(
            r"[A-Za-z0-9_./\\-]*[A-Za-z0-9_-]\.(?:{})\b",
            FILE_EXTENSIONS.join("|")
        );
        let ui = format!(r"(?i)\b(?:{})s?\b", UI_NOUNS.join("|"));

        Ok(Self {
            file: compile(&file)?,
            class: compile(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b")?,
            call: compile(r"\b([A-Za-z_][A-Za-z0-9_]*)\(\)")?,
            named_method: compile(r"(?i)\b(?:method|function|fn)\s+([A-Za-z_][A-Za-z0-9_]*)")?,
            ui: compile(&ui)?,
        })
    }

    /// Extract entity mentions, ordered by position.
    pub fn extract(&self, text: &str) -> Vec<EntityMention> {
        let mut candidates = Vec::new();

        for m in self.file.find_iter(text) {
            let literal = m.as_str().trim_start_matches("./");
            let offset = m.end() - literal.len();
            candidates.push(EntityMention {
                kind: EntityKind::File,
                text: literal.to_string(),
                reference: normalize_file(literal),
                offset,
            });
        }

        for m in self.class.find_iter(text) {
            candidates.push(EntityMention {
                kind: EntityKind::Class,
                text: m.as_str().to_string(),
                reference: m.as_str().to_string(),
                offset: m.start(),
            });
        }

        for caps in self.call.captures_iter(text) {
            if let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) {
                candidates.push(EntityMention {
                    kind: EntityKind::Method,
                    text: whole.as_str().to_string(),
                    reference: name.as_str().to_string(),
                    offset: whole.start(),
                });
            }
        }

        for caps in self.named_method.captures_iter(text) {
            if let Some(name) = caps.get(1) {
                candidates.push(EntityMention {
                    kind: EntityKind::Method,
                    text: name.as_str().to_string(),
                    reference: name.as_str().to_string(),
                    offset: name.start(),
                });
            }
        }

        for m in self.ui.find_iter(text) {
            let offset = qualifier_start(text, m.start()).unwrap_or(m.start());
            let literal = &text[offset..m.end()];
            candidates.push(EntityMention {
                kind: EntityKind::UiElement,
                text: literal.to_string(),
                reference: normalize_ui(literal),
                offset,
            });
        }

        deduplicate(candidates)
    }
}

fn compile(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern)
        .map_err(|e| Error::Internal(format!("Invalid entity pattern {pattern}: {e}")))
}

/// Start of the word directly before `noun_start`, if it can qualify a UI noun.
fn qualifier_start(text: &str, noun_start: usize) -> Option<usize> {
    let before = &text[..noun_start];
    let trimmed = before.trim_end_matches([' ', '\t']);
    if trimmed.len() == before.len() {
        return None;
    }

    let word_start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '-' || *c == '_')
        .last()
        .map(|(i, _)| i)?;
    let word = &trimmed[word_start..];

    if QUALIFIER_STOPWORDS.contains(&word.to_lowercase().as_str()) {
        None
    } else {
        Some(word_start)
    }
}

/// Lower-case with forward slashes.
pub fn normalize_file(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Lower-kebab-case: "FAB button" becomes "fab-button".
pub fn normalize_ui(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Tie-break between equally long spans.
fn precedence(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::File => 0,
        EntityKind::Method => 1,
        EntityKind::UiElement => 2,
        EntityKind::Class => 3,
    }
}

/// Keep non-overlapping spans, files first, then longer spans.
fn deduplicate(mut candidates: Vec<EntityMention>) -> Vec<EntityMention> {
    candidates.sort_by(|a, b| {
        let a_file = a.kind == EntityKind::File;
        let b_file = b.kind == EntityKind::File;
        b_file
            .cmp(&a_file)
            .then(b.text.len().cmp(&a.text.len()))
            .then(precedence(a.kind).cmp(&precedence(b.kind)))
            .then(a.offset.cmp(&b.offset))
    });

    let mut kept: Vec<EntityMention> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !kept.iter().any(|k| k.overlaps(&candidate)) {
            kept.push(candidate);
        }
    }
    kept.sort_by_key(|m| m.offset);
    kept
}
