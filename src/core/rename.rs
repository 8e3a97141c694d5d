//! Custom destination naming.
//!
//! A rename rule is a file name template. Placeholders:
//! - `{stem}`: source file name without its extension
//! - `{name}`: full source file name
//! - `{ext}`: source extension, without the dot
//! - `{index}`: 1-based position of the item in the batch; `{index:3}`
//!   zero-pads to three digits
//!
//! `{{` and `}}` produce literal braces.

use std::path::Path;

use crate::domain::MediaItemRef;

use super::error::ConfigurationError;

const MAX_INDEX_WIDTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Stem,
    Name,
    Ext,
    Index { width: usize },
}

/// A parsed, validated rename rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRule {
    template: String,
    tokens: Vec<Token>,
}

impl RenameRule {
    /// Parse `template`, rejecting empty rules, unknown placeholders,
    /// unbalanced braces and path separators
    pub fn parse(template: &str) -> Result<Self, ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidRenameRule {
            rule: template.to_string(),
            reason: reason.to_string(),
        };

        if template.trim().is_empty() {
            return Err(invalid("rule is empty"));
        }
        if template.contains(['/', '\\']) {
            return Err(invalid("rule must not contain path separators"));
        }

        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(invalid("unmatched '}'")),
                '{' => {
                    let mut placeholder = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(invalid("unclosed '{'")),
                            Some(c) => placeholder.push(c),
                        }
                    }

                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(parse_placeholder(&placeholder).map_err(|reason| invalid(&reason))?);
                }
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            template: template.to_string(),
            tokens,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the rule for `item` at 0-based `position` in the batch
    pub fn render(&self, item: &MediaItemRef, position: usize) -> String {
        let path = item.path.as_path();
        let lossy = |part: Option<&std::ffi::OsStr>| {
            part.map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Stem => out.push_str(&lossy(path.file_stem())),
                Token::Name => out.push_str(&lossy(path.file_name())),
                Token::Ext => out.push_str(&lossy(path.extension())),
                Token::Index { width } => {
                    out.push_str(&format!("{:0width$}", position + 1, width = *width))
                }
            }
        }
        out
    }
}

fn parse_placeholder(placeholder: &str) -> Result<Token, String> {
    match placeholder {
        "stem" => Ok(Token::Stem),
        "name" => Ok(Token::Name),
        "ext" => Ok(Token::Ext),
        "index" => Ok(Token::Index { width: 1 }),
        other => {
            let width = other
                .strip_prefix("index:")
                .ok_or_else(|| format!("unknown placeholder '{{{}}}'", other))?;
            match width.parse::<usize>() {
                Ok(width) if (1..=MAX_INDEX_WIDTH).contains(&width) => Ok(Token::Index { width }),
                _ => Err(format!(
                    "index width must be a number from 1 to {}",
                    MAX_INDEX_WIDTH
                )),
            }
        }
    }
}

/// Final destination file name for a rendered rule.
///
/// A format-converting chain replaces the rendered extension with its own
/// suffix; otherwise the rendered name is kept, gaining the source extension
/// when it has none.
pub fn apply_suffix(rendered: &str, output_suffix: Option<&str>, source: &Path) -> String {
    let rendered_path = Path::new(rendered);
    let has_extension = rendered_path.extension().is_some();

    match output_suffix {
        Some(suffix) => {
            let stem = if has_extension {
                rendered_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            } else {
                rendered.to_string()
            };
            format!("{}.{}", stem, suffix)
        }
        None if has_extension => rendered.to_string(),
        None => match source.extension() {
            Some(ext) => format!("{}.{}", rendered, ext.to_string_lossy()),
            None => rendered.to_string(),
        },
    }
}
