//! Template Processor - placeholder substitution for email content
//!
//! Supported placeholders:
//!
//! * `{{name}}`, `{{email}}`, `{{company}}`, `{{position}}`, `{{phone}}`
//! * `{{date}}` (e.g. "March 05, 2025"), `{{day}}` ("Wednesday"), `{{time}}` ("14:30")
//! * `{{recipient.<field>}}` and `{{contact.<field>}}` for every field in
//!   [`CONTACT_FIELDS`]
//!
//! Missing contact values render as the empty string. Unknown placeholders
//! are left in place verbatim. Substitution is a single pass, so values that
//! themselves look like placeholders are never expanded again.

use chrono::{DateTime, Utc};
use mailcrm_common::{Error, Result};
use mailcrm_storage::models::Contact;
use minijinja::{context, Environment};
use regex::{Captures, Regex};
use std::sync::OnceLock;

type FieldAccessor = fn(&Contact) -> Option<&str>;

fn field_name(c: &Contact) -> Option<&str> {
    Some(&c.name)
}

fn field_email(c: &Contact) -> Option<&str> {
    Some(&c.email)
}

fn field_company(c: &Contact) -> Option<&str> {
    c.company.as_deref()
}

fn field_position(c: &Contact) -> Option<&str> {
    c.position.as_deref()
}

fn field_phone(c: &Contact) -> Option<&str> {
    c.phone.as_deref()
}

fn field_notes(c: &Contact) -> Option<&str> {
    c.notes.as_deref()
}

/// Contact attributes exposed to templates. Identity, ownership and audit
/// columns are deliberately absent.
pub const CONTACT_FIELDS: &[(&str, FieldAccessor)] = &[
    ("name", field_name),
    ("email", field_email),
    ("company", field_company),
    ("position", field_position),
    ("phone", field_phone),
    ("notes", field_notes),
];

/// Bare keys that resolve directly against the contact
const RESERVED_CONTACT_KEYS: &[&str] = &["name", "email", "company", "position", "phone"];

/// Prefixes for attribute placeholders
const ATTRIBUTE_PREFIXES: &[&str] = &["recipient.", "contact."];

const PREVIEW_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
  body { font-family: Arial, Helvetica, sans-serif; line-height: 1.5; color: #222; }
  .email-body { max-width: 640px; margin: 0 auto; padding: 16px; }
  .email-body p { margin: 0 0 1em 0; }
</style>
</head>
<body>
<div class="email-body">
{%- for paragraph in paragraphs %}
<p>{% for line in paragraph %}{{ line }}{% if not loop.last %}<br>{% endif %}{% endfor %}</p>
{%- endfor %}
</div>
</body>
</html>
"#;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Za-z0-9_.]+)\}\}").expect("placeholder pattern is valid"))
}

fn leftover_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{[^{}]*\}\}").expect("leftover pattern is valid"))
}

fn paragraph_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n").expect("paragraph pattern is valid"))
}

/// Resolved subject and body for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMessage {
    pub subject: String,
    pub body: String,
}

/// Template processor for personalizing email content
#[derive(Debug, Clone, Default)]
pub struct TemplateProcessor;

impl TemplateProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Resolve placeholders against the contact using the current time
    pub fn resolve(&self, text: &str, contact: &Contact) -> String {
        self.resolve_with_clock(text, contact, Utc::now())
    }

    /// Resolve placeholders with an explicit clock for the date/time tokens
    pub fn resolve_with_clock(&self, text: &str, contact: &Contact, now: DateTime<Utc>) -> String {
        placeholder_regex()
            .replace_all(text, |caps: &Captures| {
                lookup(&caps[1], contact, now).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Resolve both subject and body
    pub fn resolve_message(
        &self,
        subject: &str,
        body: &str,
        contact: &Contact,
        now: DateTime<Utc>,
    ) -> ResolvedMessage {
        ResolvedMessage {
            subject: self.resolve_with_clock(subject, contact, now),
            body: self.resolve_with_clock(body, contact, now),
        }
    }

    /// Placeholder-looking tokens still present in `text`
    pub fn unresolved_placeholders(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for m in leftover_regex().find_iter(text) {
            if !found.iter().any(|f| f == m.as_str()) {
                found.push(m.as_str().to_string());
            }
        }
        found
    }

    /// Render plain text as a small HTML document for previews. Blank lines
    /// separate paragraphs, single newlines become line breaks and all text
    /// is HTML-escaped.
    pub fn to_display_html(&self, text: &str) -> Result<String> {
        let normalized = text.replace("\r\n", "\n");
        let paragraphs: Vec<Vec<&str>> = paragraph_regex()
            .split(&normalized)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.lines().map(str::trim_end).collect())
            .collect();

        let mut env = Environment::new();
        env.add_template("preview.html", PREVIEW_TEMPLATE)
            .map_err(|e| Error::Internal(format!("Invalid preview template: {}", e)))?;
        let template = env
            .get_template("preview.html")
            .map_err(|e| Error::Internal(format!("Missing preview template: {}", e)))?;

        template
            .render(context! { paragraphs => paragraphs })
            .map_err(|e| Error::Internal(format!("Failed to render preview: {}", e)))
    }
}

fn lookup(key: &str, contact: &Contact, now: DateTime<Utc>) -> Option<String> {
    match key {
        "date" => return Some(now.format("%B %d, %Y").to_string()),
        "day" => return Some(now.format("%A").to_string()),
        "time" => return Some(now.format("%H:%M").to_string()),
        _ => {}
    }

    let field = if RESERVED_CONTACT_KEYS.contains(&key) {
        key
    } else {
        ATTRIBUTE_PREFIXES
            .iter()
            .find_map(|prefix| key.strip_prefix(prefix))?
    };

    CONTACT_FIELDS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, accessor)| accessor(contact).unwrap_or("").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn contact() -> Contact {
        Contact {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            company: Some("Analytical Engines".to_string()),
            position: None,
            phone: Some("+44 20 0000".to_string()),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 5, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_reserved_placeholders() {
        let out = TemplateProcessor::new().resolve_with_clock(
            "Hi {{name}}, how is {{company}}?",
            &contact(),
            clock(),
        );
        assert_eq!(out, "Hi Ada Lovelace, how is Analytical Engines?");
    }

    #[test]
    fn test_missing_value_is_empty() {
        let out =
            TemplateProcessor::new().resolve_with_clock("Role: [{{position}}]", &contact(), clock());
        assert_eq!(out, "Role: []");
    }

    #[test]
    fn test_date_day_time() {
        let out = TemplateProcessor::new().resolve_with_clock(
            "{{date}} / {{day}} / {{time}}",
            &contact(),
            clock(),
        );
        assert_eq!(out, "March 05, 2025 / Wednesday / 14:30");
    }

    #[test]
    fn test_attribute_placeholders() {
        let processor = TemplateProcessor::new();
        let out = processor.resolve_with_clock(
            "{{recipient.phone}} {{contact.email}} {{recipient.notes}}|",
            &contact(),
            clock(),
        );
        assert_eq!(out, "+44 20 0000 ada@example.com |");
    }

    #[test]
    fn test_unknown_and_protected_placeholders_survive() {
        let processor = TemplateProcessor::new();
        let text = "{{foo}} {{recipient.id}} {{recipient.owner_id}} {{ name }}";
        let out = processor.resolve_with_clock(text, &contact(), clock());
        assert_eq!(out, text);
        assert_eq!(
            processor.unresolved_placeholders(&out),
            vec![
                "{{foo}}".to_string(),
                "{{recipient.id}}".to_string(),
                "{{recipient.owner_id}}".to_string(),
                "{{ name }}".to_string(),
            ]
        );
    }

    #[test]
    fn test_values_are_not_expanded_twice() {
        let mut c = contact();
        c.name = "{{email}}".to_string();
        let out = TemplateProcessor::new().resolve_with_clock("Hi {{name}}", &c, clock());
        assert_eq!(out, "Hi {{email}}");
    }

    #[test]
    fn test_display_html_paragraphs_and_escaping() {
        let html = TemplateProcessor::new()
            .to_display_html("Hello <Ada>,\nline two\n\nSecond & last")
            .unwrap();
        assert!(html.contains("<p>Hello &lt;Ada&gt;,<br>line two</p>"));
        assert!(html.contains("<p>Second &amp; last</p>"));
        assert!(html.contains("<style>"));
    }
}
