//! Front matter extraction and parsing.
//!
//! Two block styles are recognised at the very start of a file:
//! YAML between `---` lines and TOML between `+++` lines.

use serde::Serialize;
use serde_json::{Map, Value};

/// Key/value metadata from the head of a content file.
///
/// The processor does not interpret the values; layouts and extensions do.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FrontMatter(Map<String, Value>);

impl FrontMatter {
    /// Look up a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a value that is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// The `title` key, if present and a string.
    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for FrontMatter {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Front matter block syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
}

impl Format {
    /// Fence line that opens and closes the block.
    pub fn delimiter(self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }

    fn from_fence(line: &str) -> Option<Self> {
        match line.trim_end() {
            "---" => Some(Self::Yaml),
            "+++" => Some(Self::Toml),
            _ => None,
        }
    }

    fn parse(self, block: &str) -> Result<FrontMatter, FrontMatterError> {
        if block.trim().is_empty() {
            return Ok(FrontMatter::default());
        }

        let value = match self {
            Self::Yaml => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(block)
                    .map_err(|e| FrontMatterError::InvalidYaml(e.to_string()))?;
                serde_json::to_value(yaml)
                    .map_err(|e| FrontMatterError::InvalidYaml(e.to_string()))?
            }
            Self::Toml => {
                let table: toml::Table = toml::from_str(block)
                    .map_err(|e| FrontMatterError::InvalidToml(e.to_string()))?;
                serde_json::to_value(table)
                    .map_err(|e| FrontMatterError::InvalidToml(e.to_string()))?
            }
        };

        match value {
            Value::Object(map) => Ok(FrontMatter(map)),
            Value::Null => Ok(FrontMatter::default()),
            _ => Err(FrontMatterError::NotAMapping),
        }
    }
}

/// Split a source file into its front matter and the remaining body.
///
/// Files without an opening fence on the first line have empty front matter
/// and the whole source as body.
pub fn split_front_matter(source: &str) -> Result<(FrontMatter, &str), FrontMatterError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);

    let (first_line, rest) = source.split_once('\n').unwrap_or((source, ""));
    let Some(format) = Format::from_fence(first_line) else {
        return Ok((FrontMatter::default(), source));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == format.delimiter() {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let front_matter = format.parse(block)?;
            return Ok((front_matter, body.trim_start_matches(['\r', '\n'])));
        }
        offset += line.len();
    }

    Err(FrontMatterError::Unclosed(format.delimiter()))
}

/// Errors that can occur when parsing front matter.
#[derive(Debug, thiserror::Error)]
pub enum FrontMatterError {
    #[error("Unclosed front matter block - missing closing {0}")]
    Unclosed(&'static str),

    #[error("Invalid YAML in front matter: {0}")]
    InvalidYaml(String),

    #[error("Invalid TOML in front matter: {0}")]
    InvalidToml(String),

    #[error("Front matter must be a key/value mapping")]
    NotAMapping,
}
