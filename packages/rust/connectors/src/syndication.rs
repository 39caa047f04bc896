//! Tolerant RSS 2.0 / Atom parser.
//!
//! Job feeds in the wild are frequently malformed: truncated bodies,
//! undeclared entities, mismatched tags. An entry containing broken markup
//! is dropped and parsing carries on with the next one; the first error is
//! reported alongside the entries that survived. Unknown elements are ignored.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};

/// One `<item>` or `<entry>`, with every field kept as the feed wrote it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// `<guid>` (RSS) or `<id>` (Atom).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// `<pubDate>`, `<published>` or `<dc:date>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    /// First of `<description>`, `<summary>`, `<content>`, `<content:encoded>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Result of parsing a feed document.
#[derive(Debug, Clone, Default)]
pub struct FeedParse {
    /// Entries read without error.
    pub entries: Vec<FeedEntry>,
    /// The first structural error, if any.
    pub error: Option<String>,
}

impl FeedParse {
    /// Whether the document was malformed.
    pub fn is_bozo(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Id,
    Author,
    Published,
    Updated,
    Description,
    Category,
    Location,
    Company,
}

impl Field {
    fn from_tag(tag: &str) -> Option<Self> {
        let field = match tag {
            "title" => Self::Title,
            "link" => Self::Link,
            "guid" | "id" => Self::Id,
            "author" | "dc:creator" => Self::Author,
            "pubdate" | "published" | "dc:date" | "issued" => Self::Published,
            "updated" | "modified" => Self::Updated,
            "description" | "summary" | "content" | "content:encoded" => Self::Description,
            "category" => Self::Category,
            "location" | "job:location" => Self::Location,
            "company" | "job:company" => Self::Company,
            _ => return None,
        };
        Some(field)
    }
}

/// An open field inside the current entry.
struct OpenField {
    field: Field,
    depth: usize,
    text: String,
    /// Depth of a nested child whose text is ignored (e.g. `<author><email>`).
    skip_from: Option<usize>,
}

/// The `<item>` or `<entry>` being read.
struct OpenEntry {
    entry: FeedEntry,
    depth: usize,
    /// Set when markup inside the entry was malformed; the entry is dropped
    /// when it closes.
    damaged: bool,
}

/// Parse an RSS or Atom document.
///
/// Element nesting is tracked by name. A mismatched or stray end tag, or a
/// syntax error, discards only the entry it occurs in; reading resumes and
/// later entries are kept. The first such problem is reported in
/// [`FeedParse::error`].
pub fn parse_feed(xml: &str) -> FeedParse {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut entries = Vec::new();
    let mut error: Option<String> = None;
    let mut record = |message: String| {
        if error.is_none() {
            error = Some(message);
        }
    };

    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<OpenEntry> = None;
    let mut open: Option<OpenField> = None;
    let mut last_error_at = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let tag = tag_name(&start);
                stack.push(tag.clone());
                let depth = stack.len();

                if tag == "item" || tag == "entry" {
                    if current.take().is_some() {
                        record(format!(
                            "<{tag}> opened inside an unclosed entry (at byte {})",
                            reader.buffer_position()
                        ));
                        open = None;
                    }
                    current = Some(OpenEntry {
                        entry: FeedEntry::default(),
                        depth,
                        damaged: false,
                    });
                    continue;
                }

                let Some(entry) = current.as_mut() else {
                    continue;
                };

                if let Some(field) = open.as_mut() {
                    if field.skip_from.is_none() && !(field.field == Field::Author && tag == "name") {
                        field.skip_from = Some(depth);
                    }
                    continue;
                }

                if depth == entry.depth + 1 {
                    if let Some(field) = Field::from_tag(&tag) {
                        apply_attributes(&mut entry.entry, field, &start);
                        open = Some(OpenField {
                            field,
                            depth,
                            text: String::new(),
                            skip_from: None,
                        });
                    }
                }
            }
            Ok(Event::Empty(start)) => {
                if open.is_some() {
                    continue;
                }
                if let Some(entry) = current.as_mut() {
                    if stack.len() == entry.depth {
                        if let Some(field) = Field::from_tag(&tag_name(&start)) {
                            apply_attributes(&mut entry.entry, field, &start);
                        }
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(field) = open.as_mut().filter(|f| f.skip_from.is_none()) {
                    let chunk = match text.unescape() {
                        Ok(cow) => cow.into_owned(),
                        // Undeclared entities such as `&nbsp;` are common; keep raw text.
                        Err(_) => String::from_utf8_lossy(&text).into_owned(),
                    };
                    push_chunk(&mut field.text, &chunk);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(field) = open.as_mut().filter(|f| f.skip_from.is_none()) {
                    let chunk = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    push_chunk(&mut field.text, &chunk);
                }
            }
            Ok(Event::End(end)) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                let Some(pos) = stack.iter().rposition(|t| *t == name) else {
                    record(format!(
                        "unexpected </{name}> (at byte {})",
                        reader.buffer_position()
                    ));
                    if let Some(entry) = current.as_mut() {
                        entry.damaged = true;
                    }
                    continue;
                };

                if pos + 1 != stack.len() {
                    record(format!(
                        "expected </{}>, found </{name}> (at byte {})",
                        stack[stack.len() - 1],
                        reader.buffer_position()
                    ));
                    if let Some(entry) = current.as_mut() {
                        entry.damaged = true;
                    }
                }

                // Close every element from the top of the stack down to `name`.
                for depth in (pos + 1..=stack.len()).rev() {
                    close_level(depth, &mut open, &mut current, &mut entries);
                }
                stack.truncate(pos);
            }
            Ok(Event::Eof) => {
                if current.is_some() {
                    record("document ended inside an entry".to_string());
                } else if !stack.is_empty() {
                    record("document ended with unclosed elements".to_string());
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let position = reader.buffer_position();
                record(format!("{e} (at byte {position})"));
                if current.take().is_some() {
                    open = None;
                }
                // The reader normally skips past the bad markup; stop if it
                // cannot make progress.
                if last_error_at == Some(position) {
                    break;
                }
                last_error_at = Some(position);
            }
        }
    }

    FeedParse { entries, error }
}

/// Close the element at `depth`: finish an open field or an entry.
fn close_level(
    depth: usize,
    open: &mut Option<OpenField>,
    current: &mut Option<OpenEntry>,
    entries: &mut Vec<FeedEntry>,
) {
    if let Some(field) = open.as_mut() {
        if field.skip_from == Some(depth) {
            field.skip_from = None;
            return;
        }
        if field.depth == depth {
            if let (Some(field), Some(entry)) = (open.take(), current.as_mut()) {
                assign(&mut entry.entry, field.field, field.text);
            }
            return;
        }
        if field.depth < depth {
            return;
        }
    }

    if current.as_ref().is_some_and(|entry| entry.depth == depth) {
        *open = None;
        if let Some(entry) = current.take() {
            if !entry.damaged {
                entries.push(entry.entry);
            }
        }
    }
}

fn tag_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase()
}

fn push_chunk(buf: &mut String, chunk: &str) {
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(chunk);
}

/// Atom carries links and categories in attributes.
fn apply_attributes(entry: &mut FeedEntry, field: Field, start: &BytesStart<'_>) {
    let attr = |key: &[u8]| {
        start
            .attributes()
            .flatten()
            .find(|a| a.key.as_ref() == key)
            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
    };

    match field {
        Field::Link => {
            let rel = attr(b"rel");
            if entry.link.is_none() && rel.as_deref().is_none_or(|r| r == "alternate") {
                entry.link = attr(b"href").filter(|h| !h.trim().is_empty());
            }
        }
        Field::Category => {
            if let Some(term) = attr(b"term").filter(|t| !t.trim().is_empty()) {
                entry.categories.push(term);
            }
        }
        _ => {}
    }
}

fn assign(entry: &mut FeedEntry, field: Field, text: String) {
    let text = text.trim().to_string();
    if text.is_empty() {
        return;
    }
    let slot = match field {
        Field::Category => {
            entry.categories.push(text);
            return;
        }
        Field::Title => &mut entry.title,
        Field::Link => &mut entry.link,
        Field::Id => &mut entry.id,
        Field::Author => &mut entry.author,
        Field::Published => &mut entry.published,
        Field::Updated => &mut entry.updated,
        Field::Description => &mut entry.description,
        Field::Location => &mut entry.location,
        Field::Company => &mut entry.company,
    };
    if slot.is_none() {
        *slot = Some(text);
    }
}
