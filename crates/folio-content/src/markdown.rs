//! Markdown to HTML conversion with heading extraction.

use std::collections::HashSet;

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use serde::Serialize;

/// An entry in a page's heading index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    /// Anchor ID, unique within the document
    pub id: String,
    /// Heading text
    pub text: String,
    /// Heading level (1-6)
    pub level: u8,
}

/// HTML output of a Markdown body.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub html: String,
    pub headings: Vec<Heading>,
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

enum Step {
    Open(u8),
    Text(String),
    Close,
}

/// Render a Markdown body and collect its headings.
///
/// Every heading gets an `id` attribute in the output; the same ids are
/// returned in the heading index.
pub fn render(body: &str) -> Rendered {
    let mut events: Vec<Event<'_>> = Parser::new_ext(body, options()).collect();
    let mut headings = Vec::new();
    let mut used = HashSet::new();

    // Explicit `{#id}` attributes claim their ids first.
    for event in &events {
        if let Event::Start(Tag::Heading { id: Some(id), .. }) = event {
            used.insert(id.to_string());
        }
    }

    let mut open: Option<(usize, u8, String)> = None;

    for index in 0..events.len() {
        let step = match &events[index] {
            Event::Start(Tag::Heading { level, .. }) => Step::Open(*level as u8),
            Event::Text(text) | Event::Code(text) if open.is_some() => Step::Text(text.to_string()),
            Event::End(TagEnd::Heading(_)) => Step::Close,
            _ => continue,
        };

        match step {
            Step::Open(level) => open = Some((index, level, String::new())),
            Step::Text(text) => {
                if let Some((_, _, buf)) = open.as_mut() {
                    buf.push_str(&text);
                }
            }
            Step::Close => {
                let Some((start, level, text)) = open.take() else {
                    continue;
                };
                let text = text.trim().to_string();

                if let Event::Start(Tag::Heading { id, .. }) = &mut events[start] {
                    let anchor = if let Some(explicit) = id.as_ref() {
                        explicit.to_string()
                    } else {
                        let generated = unique_slug(&text, &mut used);
                        *id = Some(generated.clone().into());
                        generated
                    };
                    headings.push(Heading {
                        id: anchor,
                        text,
                        level,
                    });
                }
            }
        }
    }

    let mut html_output = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut html_output, events.into_iter());

    Rendered {
        html: html_output,
        headings,
    }
}

fn unique_slug(text: &str, used: &mut HashSet<String>) -> String {
    let mut base = slugify(text);
    if base.is_empty() {
        base = "section".to_string();
    }

    let mut candidate = base.clone();
    let mut n = 1;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    candidate
}

/// Convert a heading to a URL-safe slug.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
