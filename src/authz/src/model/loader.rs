//! Model text loader
//!
//! ```text
//! [request_definition]
//! r = sub, obj, act
//!
//! [policy_definition]
//! p = sub, obj, act
//!
//! [role_definition]
//! g = _, _
//!
//! [policy_effect]
//! e = some(where (p.eft == allow))
//!
//! [matchers]
//! m = g(r.sub, p.sub) && r.obj == p.obj \
//!     && r.act == p.act
//! ```

use std::path::Path;
use tracing::info;

use super::Model;
use crate::effector::EffectKind;
use crate::error::{ModelError, Result};

/// Sections every model must declare, with the header naming each
const REQUIRED_SECTIONS: &[(&str, &str)] = &[
    ("r", "request_definition"),
    ("p", "policy_definition"),
    ("e", "policy_effect"),
    ("m", "matchers"),
];

fn section_key(header: &str) -> Option<&'static str> {
    match header {
        "request_definition" => Some("r"),
        "policy_definition" => Some("p"),
        "role_definition" => Some("g"),
        "policy_effect" => Some("e"),
        "matchers" => Some("m"),
        _ => None,
    }
}

impl Model {
    /// Parse model text.
    ///
    /// # Errors
    ///
    /// * `ModelError::MissingSection` naming every absent required section
    /// * `ModelError::MalformedLine` for unknown headers and lines that are
    ///   not `key = value`
    /// * `ModelError::UnsupportedEffect` for an unrecognised `[policy_effect]`
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> std::result::Result<Self, ModelError> {
        let mut model = Model::new();
        let mut section: Option<&'static str> = None;
        let mut pending = String::new();
        let mut pending_line = 0;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with(';')) {
                continue;
            }

            if let Some(body) = line.strip_suffix('\\') {
                if pending.is_empty() {
                    pending_line = line_no;
                }
                pending.push_str(body.trim_end());
                pending.push(' ');
                continue;
            }

            let (line, line_no) = if pending.is_empty() {
                (line.to_string(), line_no)
            } else {
                pending.push_str(line);
                (std::mem::take(&mut pending), pending_line)
            };

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(section_key(header.trim()).ok_or_else(|| ModelError::MalformedLine {
                    line: line_no,
                    reason: format!("unknown section [{}]", header.trim()),
                })?);
                continue;
            }

            let Some(sec) = section else {
                return Err(ModelError::MalformedLine {
                    line: line_no,
                    reason: "definition outside of any section".to_string(),
                });
            };

            let Some((key, value)) = line.split_once('=') else {
                return Err(ModelError::MalformedLine {
                    line: line_no,
                    reason: "expected 'key = value'".to_string(),
                });
            };

            let key = key.trim();
            if !key.starts_with(sec) || !key[sec.len()..].chars().all(|c| c.is_ascii_digit()) {
                return Err(ModelError::MalformedLine {
                    line: line_no,
                    reason: format!("key '{}' does not belong in section '{}'", key, sec),
                });
            }

            if !model.add_def(sec, key, value.trim()) {
                return Err(ModelError::MalformedLine {
                    line: line_no,
                    reason: format!("empty definition for '{}'", key),
                });
            }
        }

        let missing: Vec<String> = REQUIRED_SECTIONS
            .iter()
            .filter(|(sec, _)| !model.has_section(sec))
            .map(|(_, name)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ModelError::MissingSection(missing));
        }

        for assertion in model.assertions("e") {
            EffectKind::parse(&assertion.value)?;
        }

        Ok(model)
    }

    /// Read and parse a model file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let model = Self::from_str(&text)?;
        info!(path = %path.display(), "Loaded model");
        Ok(model)
    }
}
