//! Placeholder templates for prompts and report filenames.
//!
//! Templates are configuration data. A [`Template`] can only be constructed
//! through [`Template::parse`], which checks that every placeholder the
//! template's [`TemplateKind`] mandates is present and that no unknown
//! placeholder appears. Rendering is a pure function of the template and a set
//! of bindings and fails closed: a placeholder without a binding is an error,
//! never left in the output.
//!
//! ## Syntax
//!
//! - `{name}` is substituted with the binding for `name` (`name` is an ASCII
//!   identifier).
//! - `{{` / `}}` render a literal `{` / `}`.
//! - Any other brace (e.g. `{"key": 1}` in an example JSON snippet, or a `{`
//!   that is never closed) is copied verbatim.
//!
//! Substituted values are never re-scanned, so a speech that happens to contain
//! `{member_name}` is passed through untouched.

use crate::{ConfigError, PromptError};

/// Binding name for the member's display name.
pub const MEMBER_NAME: &str = "member_name";
/// Binding name for the cleaned speech corpus.
pub const SPEECHES_TEXT: &str = "speeches_text";
/// Binding name for the initial-stage output.
pub const INITIAL_ANALYSIS_TEXT: &str = "initial_analysis_text";
/// Binding name for the number of members in the report.
pub const NUM_MEMBERS: &str = "num_members";
/// Binding name for the first day of the report window.
pub const DATE_FROM: &str = "date_from";
/// Binding name for the last day of the report window.
pub const DATE_TO: &str = "date_to";
/// Binding name for the offset of the first selected member.
pub const START_INDEX: &str = "start_index";

/// What a template is used for; determines its placeholder contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Prompt for the first analysis stage.
    InitialAnalysis,
    /// Prompt for the refinement stage.
    RefinementAnalysis,
    /// Report filename.
    ReportFilename,
}

impl TemplateKind {
    /// Placeholders that must appear in the template.
    pub fn required(self) -> &'static [&'static str] {
        match self {
            Self::InitialAnalysis => &[MEMBER_NAME, SPEECHES_TEXT],
            Self::RefinementAnalysis => &[MEMBER_NAME, INITIAL_ANALYSIS_TEXT],
            Self::ReportFilename => &[NUM_MEMBERS, DATE_FROM, DATE_TO],
        }
    }

    /// Placeholders that may appear in addition to the required ones.
    pub fn optional(self) -> &'static [&'static str] {
        match self {
            Self::InitialAnalysis | Self::RefinementAnalysis => &[],
            Self::ReportFilename => &[START_INDEX],
        }
    }

    /// `Section.key` of the configuration entry holding this template.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::InitialAnalysis => "Prompts.InitialAnalysis.template",
            Self::RefinementAnalysis => "Prompts.RefinementAnalysis.template",
            Self::ReportFilename => "Output.report_filename_template",
        }
    }

    fn allows(self, name: &str) -> bool {
        self.required().contains(&name) || self.optional().contains(&name)
    }
}

/// A validated template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    kind: TemplateKind,
    text: String,
}

impl Template {
    /// Parses and validates `text` against the contract of `kind`.
    pub fn parse(kind: TemplateKind, text: impl Into<String>) -> Result<Self, ConfigError> {
        let text = text.into();
        let key = kind.config_key();

        let found: Vec<&str> = segments(&text)
            .into_iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect();

        if let Some(unknown) = found.iter().find(|name| !kind.allows(name)) {
            return Err(ConfigError::MalformedTemplate {
                key: key.to_string(),
                source: PromptError::UnboundPlaceholder {
                    name: (*unknown).to_string(),
                },
            });
        }

        if let Some(missing) = kind.required().iter().find(|name| !found.contains(name)) {
            return Err(ConfigError::MissingPlaceholder {
                key: key.to_string(),
                placeholder: (*missing).to_string(),
            });
        }

        Ok(Self { kind, text })
    }

    /// The template's kind.
    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Substitutes every placeholder with its binding.
    ///
    /// Bindings not referenced by the template are ignored. A referenced
    /// placeholder without a binding yields [`PromptError::UnboundPlaceholder`].
    pub fn render(&self, bindings: &[(&str, &str)]) -> Result<String, PromptError> {
        let mut out = String::with_capacity(
            self.text.len() + bindings.iter().map(|(_, v)| v.len()).sum::<usize>(),
        );
        for segment in segments(&self.text) {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = bindings
                        .iter()
                        .find(|(k, _)| *k == name)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| PromptError::UnboundPlaceholder {
                            name: name.to_string(),
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn segments(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            // Escaped brace: keep one, drop the other.
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                out.push(Segment::Literal(&text[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            b'{' => match text[i + 1..].find('}').map(|p| i + 1 + p) {
                Some(close) if is_identifier(&text[i + 1..close]) => {
                    out.push(Segment::Literal(&text[literal_start..i]));
                    out.push(Segment::Placeholder(&text[i + 1..close]));
                    i = close + 1;
                    literal_start = i;
                }
                _ => i += 1,
            },
            _ => i += 1,
        }
    }
    out.push(Segment::Literal(&text[literal_start..]));
    out.retain(|s| !matches!(s, Segment::Literal("")));
    out
}
