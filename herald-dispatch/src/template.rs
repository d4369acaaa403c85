//! Subject and body templates.
//!
//! Templates are plain text with `{{placeholder}}` markers. Supported
//! placeholders are `candidate_name`, `application_no`, `roll_no` and
//! `email`. Templates are parsed once, at startup, so an unknown placeholder
//! is a configuration error rather than a failed send.

use core::str::FromStr;

use herald_common::{ConfigError, Record, TemplateConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    CandidateName,
    ApplicationNo,
    RollNo,
    Email,
}

impl FromStr for Field {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "candidate_name" => Ok(Self::CandidateName),
            "application_no" => Ok(Self::ApplicationNo),
            "roll_no" => Ok(Self::RollNo),
            "email" => Ok(Self::Email),
            other => Err(ConfigError::Template(format!(
                "unknown placeholder {{{{{other}}}}}"
            ))),
        }
    }
}

impl Field {
    fn value(self, record: &Record) -> &str {
        match self {
            Self::CandidateName => &record.candidate_name,
            Self::ApplicationNo => &record.key.application_no,
            Self::RollNo => &record.key.roll_no,
            Self::Email => &record.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl FromStr for Template {
    type Err = ConfigError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                ConfigError::Template(format!("unclosed placeholder at {:?}", &rest[start..]))
            })?;

            segments.push(Segment::Field(after[..end].trim().parse()?));
            rest = &after[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }
}

impl Template {
    /// Substitute placeholders verbatim.
    #[must_use]
    pub fn render(&self, record: &Record) -> String {
        self.render_with(record, |value, out| out.push_str(value))
    }

    /// Substitute placeholders with HTML-escaped values. Literal text is
    /// left as written.
    #[must_use]
    pub fn render_html(&self, record: &Record) -> String {
        self.render_with(record, escape_html)
    }

    fn render_with(&self, record: &Record, insert: impl Fn(&str, &mut String)) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => insert(field.value(record), &mut out),
            }
        }
        out
    }
}

fn escape_html(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

/// The subject and body templates for every message in a run.
#[derive(Debug, Clone)]
pub struct Templates {
    pub subject: Template,
    pub body: Template,
}

impl Templates {
    pub fn from_config(config: &TemplateConfig) -> Result<Self, ConfigError> {
        let subject: Template = config.subject.parse()?;
        if config.subject.contains(['\r', '\n']) {
            return Err(ConfigError::Template(
                "subject must be a single line".to_string(),
            ));
        }

        Ok(Self {
            subject,
            body: config.body.parse()?,
        })
    }

    #[must_use]
    pub fn subject(&self, record: &Record) -> String {
        self.subject.render(record)
    }

    #[must_use]
    pub fn body(&self, record: &Record) -> String {
        self.body.render_html(record)
    }
}
