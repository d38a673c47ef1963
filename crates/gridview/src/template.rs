//! Assembly of the Python payloads sent to the kernel.
//!
//! A payload is the helper template, one call to the helper, and a cleanup
//! statement that removes the helper from the kernel namespace again.

use std::path::{Path, PathBuf};

use log::debug;

use crate::error::TemplateError;

/// Name of the function defined by the helper template.
pub const HELPER_FUNCTION: &str = "_VSCODE_getDataFrame";

/// Appended to every payload so the helper does not leak into user globals.
pub const CLEANUP: &str = "del _VSCODE_getDataFrame";

/// Location of the helper relative to an installation root.
pub const TEMPLATE_RELATIVE_PATH: &str = "python/dataframe_helper.py";

const BUNDLED_HELPER: &str = include_str!("../python/dataframe_helper.py");

/// What the helper is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Column names and row count.
    Info,
    /// A slice of the row data.
    Rows,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Info => "info",
            FetchMode::Rows => "rows",
        }
    }
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The helper source plus the operations that build payloads from it.
#[derive(Debug, Clone)]
pub struct CodeTemplate {
    helper: String,
}

impl CodeTemplate {
    /// The helper compiled into the binary.
    pub fn bundled() -> Self {
        CodeTemplate {
            helper: BUNDLED_HELPER.to_string(),
        }
    }

    pub fn from_source(helper: impl Into<String>) -> Self {
        CodeTemplate {
            helper: helper.into(),
        }
    }

    /// Read a helper template from disk.
    pub async fn load(path: &Path) -> Result<Self, TemplateError> {
        let helper = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TemplateError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_source(helper))
    }

    /// Find the template to use.
    ///
    /// An explicit override must be readable. Otherwise the copy under
    /// `root` wins when present, falling back to the bundled helper.
    pub async fn locate(override_path: Option<&Path>, root: &Path) -> Result<Self, TemplateError> {
        if let Some(path) = override_path {
            debug!("Using helper template override {:?}", path);
            return Self::load(path).await;
        }
        let candidate: PathBuf = root.join(TEMPLATE_RELATIVE_PATH);
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            debug!("Using helper template {:?}", candidate);
            return Self::load(&candidate).await;
        }
        Ok(Self::bundled())
    }

    pub fn helper(&self) -> &str {
        &self.helper
    }

    /// Payload asking for the column list and row count of `variable`.
    pub fn info_payload(&self, variable: &str) -> Result<String, TemplateError> {
        validate_variable_name(variable)?;
        Ok(self.assemble(&format!(
            "{}(\"{}\", False, {})",
            HELPER_FUNCTION,
            FetchMode::Info,
            variable
        )))
    }

    /// Payload asking for rows `start..end` of `variable`.
    pub fn rows_payload(
        &self,
        variable: &str,
        start: usize,
        end: usize,
    ) -> Result<String, TemplateError> {
        validate_variable_name(variable)?;
        if start > end {
            return Err(TemplateError::InvalidRange { start, end });
        }
        Ok(self.assemble(&format!(
            "{}(\"{}\", False, {}, {}, {})",
            HELPER_FUNCTION,
            FetchMode::Rows,
            variable,
            start,
            end
        )))
    }

    /// The cleanup runs in a `finally`, so a call that raises still removes the helper.
    fn assemble(&self, call: &str) -> String {
        format!(
            "{}\n\ntry:\n    {}\nfinally:\n    {}\n",
            self.helper.trim_end(),
            call,
            CLEANUP
        )
    }
}

/// Accept only dotted Python identifiers such as `df` or `results.frame`.
///
/// The name is spliced into executed code, so anything else is rejected.
pub fn validate_variable_name(name: &str) -> Result<(), TemplateError> {
    let valid_segment = |segment: &str| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c == '_' || c.is_alphabetic() => {
                chars.all(|c| c == '_' || c.is_alphanumeric())
            }
            _ => false,
        }
    };
    if !name.is_empty() && name.split('.').all(valid_segment) {
        Ok(())
    } else {
        Err(TemplateError::InvalidVariableName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bundled_helper_defines_function() {
        let template = CodeTemplate::bundled();
        assert!(template
            .helper()
            .contains(&format!("def {}(", HELPER_FUNCTION)));
    }

    #[test]
    fn test_info_payload_layout() {
        let template = CodeTemplate::from_source("HELPER\n");
        let payload = template.info_payload("df").unwrap();
        assert_eq!(
            payload,
            "HELPER\n\ntry:\n    _VSCODE_getDataFrame(\"info\", False, df)\n\
             finally:\n    del _VSCODE_getDataFrame\n"
        );
    }

    #[test]
    fn test_rows_payload_includes_range() {
        let template = CodeTemplate::from_source("HELPER");
        let payload = template.rows_payload("results.frame", 0, 25).unwrap();
        assert!(payload.contains("_VSCODE_getDataFrame(\"rows\", False, results.frame, 0, 25)"));
        assert!(payload.ends_with("finally:\n    del _VSCODE_getDataFrame\n"));
    }

    #[test]
    fn test_rows_payload_rejects_inverted_range() {
        let template = CodeTemplate::from_source("HELPER");
        assert!(matches!(
            template.rows_payload("df", 5, 2),
            Err(TemplateError::InvalidRange { start: 5, end: 2 })
        ));
    }

    #[test]
    fn test_variable_names() {
        for ok in ["df", "_private", "frame2", "a.b.c", "données"] {
            assert!(validate_variable_name(ok).is_ok(), "{ok} should be valid");
        }
        for bad in [
            "",
            "2df",
            "df)",
            "df; import os",
            "a..b",
            "df[0]",
            "x\nprint(1)",
        ] {
            assert!(validate_variable_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_injection_never_reaches_payload() {
        let template = CodeTemplate::bundled();
        assert!(template
            .info_payload("df, __import__('os').system('x')")
            .is_err());
    }

    #[tokio::test]
    async fn test_locate_prefers_override_then_root_then_bundled() {
        let dir = TempDir::new().unwrap();

        let bundled = CodeTemplate::locate(None, dir.path()).await.unwrap();
        assert_eq!(bundled.helper(), BUNDLED_HELPER);

        let rooted = dir.path().join(TEMPLATE_RELATIVE_PATH);
        std::fs::create_dir_all(rooted.parent().unwrap()).unwrap();
        std::fs::write(&rooted, "ROOT").unwrap();
        let found = CodeTemplate::locate(None, dir.path()).await.unwrap();
        assert_eq!(found.helper(), "ROOT");

        let custom = dir.path().join("custom.py");
        std::fs::write(&custom, "CUSTOM").unwrap();
        let found = CodeTemplate::locate(Some(&custom), dir.path()).await.unwrap();
        assert_eq!(found.helper(), "CUSTOM");
    }

    #[tokio::test]
    async fn test_missing_override_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.py");
        assert!(matches!(
            CodeTemplate::locate(Some(&missing), dir.path()).await,
            Err(TemplateError::Read { .. })
        ));
    }
}
