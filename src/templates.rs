//! Named SQL templates loaded from `/*NAME*/`-delimited files.
//!
//! ```sql
//! /*GET_USER*/
//! SELECT * FROM users WHERE ?;
//!
//! /*RENAME_USER*/
//! UPDATE users SET ? WHERE ?
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlTemplateError;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*([A-Za-z_][A-Za-z0-9_]*)\*/").expect("valid marker regex"));

/// A named, immutable SQL statement with placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    name: String,
    sql: String,
    source: String,
}

impl QueryTemplate {
    /// A template that does not come from a file.
    #[must_use]
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            source: crate::stats::ADHOC_SOURCE.to_string(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// File (or other origin) the template was loaded from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Templates parsed from one source, in file order.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    source: String,
    templates: Vec<QueryTemplate>,
    by_name: HashMap<String, usize>,
}

impl TemplateRegistry {
    /// Read and parse a template file. The path as given becomes the registry's source name.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::TemplateLoad`] if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self, SqlTemplateError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SqlTemplateError::TemplateLoad(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&contents, &path.to_string_lossy())
    }

    /// Parse template text.
    ///
    /// Each `/*NAME*/` marker starts a block that runs to the next marker or the end of input.
    /// Bodies are trimmed and lose one trailing `;`. Text before the first marker is ignored.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::TemplateLoad`] when there are no markers, a name repeats, or a
    /// body is empty.
    pub fn parse(contents: &str, source: &str) -> Result<Self, SqlTemplateError> {
        let markers: Vec<_> = MARKER.captures_iter(contents).collect();
        if markers.is_empty() {
            return Err(SqlTemplateError::TemplateLoad(format!(
                "{source}: no /*NAME*/ templates found"
            )));
        }

        let mut registry = TemplateRegistry {
            source: source.to_string(),
            ..TemplateRegistry::default()
        };
        for (i, caps) in markers.iter().enumerate() {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = markers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(contents.len(), |m| m.start());
            let body = contents[whole.end()..end].trim();
            let body = body.strip_suffix(';').unwrap_or(body).trim_end();
            if body.is_empty() {
                return Err(SqlTemplateError::TemplateLoad(format!(
                    "{source}: template {} is empty",
                    name.as_str()
                )));
            }
            registry.insert(QueryTemplate {
                name: name.as_str().to_string(),
                sql: body.to_string(),
                source: source.to_string(),
            })?;
        }
        tracing::debug!(source, count = registry.templates.len(), "parsed templates");
        Ok(registry)
    }

    fn insert(&mut self, template: QueryTemplate) -> Result<(), SqlTemplateError> {
        if self.by_name.contains_key(&template.name) {
            return Err(SqlTemplateError::TemplateLoad(format!(
                "{}: duplicate template {}",
                self.source, template.name
            )));
        }
        self.by_name
            .insert(template.name.clone(), self.templates.len());
        self.templates.push(template);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&QueryTemplate> {
        self.by_name.get(name).map(|&i| &self.templates[i])
    }

    /// Like [`TemplateRegistry::get`], with a descriptive error for unknown names.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::TemplateLoad`] if no template has that name.
    pub fn require(&self, name: &str) -> Result<&QueryTemplate, SqlTemplateError> {
        self.get(name).ok_or_else(|| {
            SqlTemplateError::TemplateLoad(format!("{}: no template named {name}", self.source))
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryTemplate> {
        self.templates.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(QueryTemplate::name)
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
