//! Prompt text for the built-in actions and user templates.

use serde::{Deserialize, Serialize};

use super::error::AiError;

/// Built-in editor actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiAction {
    Continue,
    Rewrite,
    TranslateZh,
    TranslateEn,
    Summary,
}

impl AiAction {
    pub const ALL: [Self; 5] = [
        Self::Continue,
        Self::Rewrite,
        Self::TranslateZh,
        Self::TranslateEn,
        Self::Summary,
    ];

    /// Stable id, also used for "recent actions" entries.
    pub const fn id(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Rewrite => "rewrite",
            Self::TranslateZh => "translate_zh",
            Self::TranslateEn => "translate_en",
            Self::Summary => "summary",
        }
    }

    /// Title for the result panel.
    pub const fn title(self) -> &'static str {
        match self {
            Self::Continue => "Continue Result",
            Self::Rewrite => "Rewrite Result",
            Self::TranslateZh => "Translate to Chinese",
            Self::TranslateEn => "Translate to English",
            Self::Summary => "Summary",
        }
    }

    /// Prompt for this action applied to `source`.
    pub fn prompt(self, source: &str) -> String {
        match self {
            Self::Continue => format!(
                "Continue writing based on the following Markdown content, keeping the same style and language:\n\n{source}"
            ),
            Self::Rewrite => format!(
                "Rewrite the following content so it is clearer and more concise while keeping its meaning:\n\n{source}\n\nOutput only the rewritten content."
            ),
            Self::TranslateZh => format!(
                "Translate the following content into Simplified Chinese. Output only the translation.\n\n{source}"
            ),
            Self::TranslateEn => format!(
                "Translate the following content into natural English. Output only the translation.\n\n{source}"
            ),
            Self::Summary => format!(
                "Summarize the following content as 5 key points in an unordered list. Output only the key points.\n\n{source}"
            ),
        }
    }
}

/// Which text an action works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Selection,
    #[default]
    Document,
}

/// The editor text available to an action.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceText<'a> {
    pub selection: &'a str,
    pub document: &'a str,
}

impl<'a> SourceText<'a> {
    /// Text for `scope`.
    ///
    /// # Errors
    /// Returns [`AiError::EmptySelection`] for [`Scope::Selection`] with
    /// nothing selected.
    pub fn pick(&self, scope: Scope) -> Result<&'a str, AiError> {
        match scope {
            Scope::Selection if self.selection.is_empty() => Err(AiError::EmptySelection),
            Scope::Selection => Ok(self.selection),
            Scope::Document => Ok(self.document),
        }
    }
}

/// Build the prompt for a built-in action.
///
/// # Errors
/// Returns [`AiError::EmptySelection`] if `scope` is the selection and it
/// is empty.
pub fn build_prompt(action: AiAction, scope: Scope, text: &SourceText<'_>) -> Result<String, AiError> {
    Ok(action.prompt(text.pick(scope)?))
}

/// Optional values for `{lang}` and `{style}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateVars {
    pub lang: Option<String>,
    pub style: Option<String>,
}

/// A user-defined action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomTemplate {
    pub id: String,
    pub title: String,
    pub body: String,
    pub scope: Scope,
    pub enabled: bool,
    pub vars: TemplateVars,
}

/// Context values a template may reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateContext<'a> {
    /// Path of the current file, empty for an unsaved document
    pub file_path: &'a str,
    pub model: &'a str,
    pub provider: &'a str,
    /// Today's date as `YYYY-MM-DD`
    pub date: &'a str,
}

impl CustomTemplate {
    /// Title for the result panel.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "AI Result"
        } else {
            &self.title
        }
    }

    /// Expand the template body into a prompt.
    ///
    /// Placeholders are substituted in one pass, so placeholder-like text
    /// inside the user's document is left alone. `{lang}` and `{style}`
    /// without a value (unset or empty) stay verbatim, as do unknown
    /// placeholders.
    ///
    /// # Errors
    /// Returns [`AiError::EmptySelection`] for a selection-scoped template
    /// with nothing selected.
    pub fn expand(&self, text: &SourceText<'_>, context: &TemplateContext<'_>) -> Result<String, AiError> {
        let source = text.pick(self.scope)?;
        let filename = file_name(context.file_path);
        Ok(substitute(&self.body, |name| match name {
            "text" => Some(source),
            "lang" => self.vars.lang.as_deref().filter(|v| !v.is_empty()),
            "style" => self.vars.style.as_deref().filter(|v| !v.is_empty()),
            "date" => Some(context.date),
            "filename" => Some(filename),
            "model" => Some(context.model),
            "provider" => Some(context.provider),
            _ => None,
        }))
    }
}

/// Last path component, accepting both separators.
fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or_default()
}

fn substitute<'v>(body: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| lookup(&after[..close]).map(|value| (value, close)));
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
