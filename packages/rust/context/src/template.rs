//! Placeholder substitution for the context template.
//!
//! Substitution is exact string replacement of a fixed placeholder set, not a
//! templating engine. Unknown `{{...}}` tokens are left untouched.

use chrono::{DateTime, Datelike, TimeZone, Weekday};
use serde::Serialize;

pub const QUERY: &str = "{{query}}";
pub const CONTEXTS: &str = "{{contexts}}";
pub const CURRENT_TIME: &str = "{{current_time}}";
pub const CURRENT_WEEK: &str = "{{current_week}}";

/// Format used for `{{current_time}}`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A documented placeholder, for display in configuration tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptPlaceholder {
    /// Token as written in a template, e.g. `{{query}}`.
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

/// Prompt fields that accept placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptField {
    ContextTemplate,
    SystemPrompt,
}

impl PromptField {
    pub const ALL: [PromptField; 2] = [Self::ContextTemplate, Self::SystemPrompt];

    /// Config key holding this field.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::ContextTemplate => "pipeline.context_template",
            Self::SystemPrompt => "pipeline.system_prompt",
        }
    }
}

const QUERY_PLACEHOLDER: PromptPlaceholder = PromptPlaceholder {
    name: QUERY,
    label: "User question",
    description: "The validated user query, trimmed",
};

const CONTEXTS_PLACEHOLDER: PromptPlaceholder = PromptPlaceholder {
    name: CONTEXTS,
    label: "Retrieved contexts",
    description: "Fused retrieval results rendered as a numbered list or FAQ/document sections",
};

const CURRENT_TIME_PLACEHOLDER: PromptPlaceholder = PromptPlaceholder {
    name: CURRENT_TIME,
    label: "Current time",
    description: "Local wall-clock time as YYYY-MM-DD HH:MM:SS",
};

const CURRENT_WEEK_PLACEHOLDER: PromptPlaceholder = PromptPlaceholder {
    name: CURRENT_WEEK,
    label: "Current weekday",
    description: "English weekday name, e.g. Monday",
};

/// Placeholders supported by a prompt field.
pub fn placeholders_for(field: PromptField) -> &'static [PromptPlaceholder] {
    const CONTEXT_TEMPLATE: &[PromptPlaceholder] = &[
        QUERY_PLACEHOLDER,
        CONTEXTS_PLACEHOLDER,
        CURRENT_TIME_PLACEHOLDER,
        CURRENT_WEEK_PLACEHOLDER,
    ];
    const SYSTEM_PROMPT: &[PromptPlaceholder] =
        &[CURRENT_TIME_PLACEHOLDER, CURRENT_WEEK_PLACEHOLDER];

    match field {
        PromptField::ContextTemplate => CONTEXT_TEMPLATE,
        PromptField::SystemPrompt => SYSTEM_PROMPT,
    }
}

/// English weekday name.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Substitute the time placeholders only. Used for system prompts.
pub fn render_time_placeholders<Tz>(template: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    template
        .replace(CURRENT_TIME, &now.format(TIME_FORMAT).to_string())
        .replace(CURRENT_WEEK, weekday_name(now.weekday()))
}

/// Substitute every context-template placeholder.
///
/// `query` must already be validated. Replacement order is query, contexts,
/// then time, so a query or passage containing a later token is expanded too.
pub fn render_template<Tz>(template: &str, query: &str, contexts: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let rendered = template.replace(QUERY, query).replace(CONTEXTS, contexts);
    render_time_placeholders(&rendered, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed_time() -> DateTime<Utc> {
        // 2024-03-15 was a Friday.
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 5, 7).unwrap()
    }

    #[test]
    fn all_placeholders_substituted() {
        let template = "Q: {{query}}\nC: {{contexts}}\nT: {{current_time}} ({{current_week}})";
        let out = render_template(template, "why?", "[1] because", &fixed_time());
        assert_eq!(out, "Q: why?\nC: [1] because\nT: 2024-03-15 09:05:07 (Friday)");
    }

    #[test]
    fn unknown_placeholders_untouched() {
        let out = render_template("{{query}} {{tenant}}", "q", "", &fixed_time());
        assert_eq!(out, "q {{tenant}}");
    }

    #[test]
    fn repeated_placeholders_all_replaced() {
        let out = render_template("{{query}} / {{query}}", "same", "", &fixed_time());
        assert_eq!(out, "same / same");
    }

    #[test]
    fn template_without_placeholders_is_unchanged() {
        let out = render_template("static prompt", "q", "ctx", &fixed_time());
        assert_eq!(out, "static prompt");
    }

    #[test]
    fn system_prompt_only_gets_time() {
        let out = render_time_placeholders("Today is {{current_week}}. {{query}}", &fixed_time());
        assert_eq!(out, "Today is Friday. {{query}}");
    }

    #[test]
    fn placeholder_catalogue() {
        let names: Vec<_> = placeholders_for(PromptField::ContextTemplate)
            .iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec!["{{query}}", "{{contexts}}", "{{current_time}}", "{{current_week}}"]
        );
        assert_eq!(placeholders_for(PromptField::SystemPrompt).len(), 2);
    }

    #[test]
    fn default_context_template_uses_every_catalogued_placeholder() {
        let defaults = kbchat_shared::PipelineConfig::default();
        for placeholder in placeholders_for(PromptField::ContextTemplate) {
            assert!(
                defaults.context_template.contains(placeholder.name),
                "default template is missing {}",
                placeholder.name
            );
        }
        assert_eq!(
            PromptField::ALL.map(PromptField::config_key),
            ["pipeline.context_template", "pipeline.system_prompt"]
        );
    }
}
