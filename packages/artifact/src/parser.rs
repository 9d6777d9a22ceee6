use crate::action::{ActionKind, BuildAction, BuildStep};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// Opening tag of any element, with its attribute list captured raw
static OPEN_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<([A-Za-z][\w-]*)((?:\s+[\w:-]+\s*=\s*"[^"]*")*)\s*(/?)>"#)
        .expect("open tag pattern is valid")
});

/// One `name="value"` attribute pair
static ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([\w:-]+)\s*=\s*"([^"]*)""#).expect("attribute pattern is valid"));

/// Stateless parser turning one artifact document into ordered build actions.
///
/// The artifact is a document of action elements, each carrying a `type`
/// discriminator (`file` | `shell` | `folder`) and, for file-producing
/// types, a path attribute; the element's inner text is the payload.
/// Envelope and unrecognized elements are ignored, and a malformed element
/// degrades to a skipped entry rather than failing the parse. Parsing the
/// same text twice yields identical sequences.
pub struct ArtifactParser;

impl ArtifactParser {
    /// Parse an artifact into actions numbered from sequence 0
    pub fn parse(text: &str) -> Vec<BuildAction> {
        Self::parse_from(text, 0)
    }

    /// Parse an artifact, numbering actions from `base_sequence`.
    ///
    /// Conversation turns append their artifacts to a running step list, so
    /// each turn parses with the sequence base left off by the previous one.
    pub fn parse_from(text: &str, base_sequence: usize) -> Vec<BuildAction> {
        let mut actions = Vec::new();
        let mut cursor = 0;

        while let Some(m) = OPEN_TAG.find(&text[cursor..]) {
            let tag_start = cursor + m.start();
            let tag_end = cursor + m.end();
            let caps = OPEN_TAG
                .captures(&text[tag_start..tag_end])
                .expect("find and captures agree");

            let element = caps.get(1).map_or("", |c| c.as_str());
            let attrs = parse_attrs(caps.get(2).map_or("", |c| c.as_str()));
            let self_closing = caps.get(3).is_some_and(|c| !c.as_str().is_empty());

            let Some(kind) = attrs.get("type").and_then(|t| action_kind(t)) else {
                // Envelope or unrecognized element: scan its interior
                cursor = tag_end;
                continue;
            };

            let path = attrs
                .get("filePath")
                .or_else(|| attrs.get("path"))
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty());

            if kind.takes_path() && path.is_none() {
                debug!(element, kind = kind.as_str(), "skipping action without a path");
                cursor = tag_end;
                continue;
            }

            let (payload, next_cursor) = if self_closing {
                (String::new(), tag_end)
            } else {
                let close = format!("</{}>", element);
                match text[tag_end..].find(&close) {
                    Some(rel) => {
                        let inner = &text[tag_end..tag_end + rel];
                        (decode_entities(inner.trim()), tag_end + rel + close.len())
                    }
                    None => {
                        debug!(element, "skipping unterminated action element");
                        cursor = tag_end;
                        continue;
                    }
                }
            };

            if kind == ActionKind::RunScript && payload.is_empty() {
                debug!(element, "skipping shell action with empty command");
                cursor = next_cursor;
                continue;
            }

            actions.push(BuildAction {
                kind,
                path,
                payload,
                sequence: base_sequence + actions.len(),
            });
            cursor = next_cursor;
        }

        actions
    }

    /// Parse an artifact directly into pending steps.
    ///
    /// `next_id` and `next_sequence` continue the running step list across
    /// conversation turns.
    pub fn parse_steps(text: &str, next_id: usize, next_sequence: usize) -> Vec<BuildStep> {
        Self::parse_from(text, next_sequence)
            .into_iter()
            .enumerate()
            .map(|(offset, action)| BuildStep::new(next_id + offset, action))
            .collect()
    }
}

fn parse_attrs(raw: &str) -> HashMap<&str, &str> {
    ATTR.captures_iter(raw)
        .filter_map(|c| {
            let key = c.get(1)?.as_str();
            let value = c.get(2)?.as_str();
            Some((key, value))
        })
        .collect()
}

fn action_kind(type_attr: &str) -> Option<ActionKind> {
    match type_attr {
        "file" => Some(ActionKind::CreateFile),
        "shell" | "command" => Some(ActionKind::RunScript),
        "folder" => Some(ActionKind::CreateFolder),
        _ => None,
    }
}

/// Decode the XML entity escapes the generator applies to inner text
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
