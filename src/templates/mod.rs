// Template system for commit messages and merge request descriptions
//
// Resolution order:
// 1. Project (.branchwork/templates/<name>.tera)
// 2. Builtin

pub mod builtin;

use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};

use crate::error::TemplateError;
use crate::utils::branchwork_dir;

/// Values available to the commit message template
#[derive(Debug, Clone, Serialize)]
pub struct CommitMessageContext {
    pub agent_type: String,
    pub task_title: String,
    pub agent_id: String,
    pub files_modified: u64,
    pub tests_run: u64,
    pub quality_passed: bool,
    pub target_branch: String,
}

/// Values available to the merge request description template
#[derive(Debug, Clone, Serialize)]
pub struct MergeRequestContext {
    pub agent_id: String,
    pub branch: String,
    pub target_branch: String,
    /// Minutes since the session started, one decimal
    pub execution_minutes: String,
    pub commit_id: Option<String>,
    pub files_analyzed: u64,
    pub files_modified: u64,
    pub tests_run: u64,
    pub commits_made: u64,
    pub conflicts_resolved: u64,
    pub analysis_passed: bool,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub format_applied: bool,
    pub findings: Vec<String>,
    pub task_description: String,
    pub conflicts_checked: bool,
    pub conflicts_clear: bool,
    pub ready_for_review: bool,
}

/// Tera wrapper holding the builtin templates plus project overrides
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Engine with the builtin templates only
    pub fn new() -> Self {
        let mut tera = Tera::default();
        for (name, content) in builtin::get_builtin_templates() {
            if let Err(e) = tera.add_raw_template(&name, &content) {
                log::error!("[TemplateEngine] Builtin template '{}' is invalid: {}", name, e);
            }
        }
        Self { tera }
    }

    /// Engine with project templates from `<repo>/.branchwork/templates/`
    /// layered over the builtins. Invalid overrides are logged and skipped.
    pub fn for_repo(repo_path: &Path) -> Self {
        let mut engine = Self::new();
        let templates_dir = branchwork_dir(repo_path).join("templates");

        for name in [builtin::COMMIT_MESSAGE, builtin::MERGE_REQUEST_DESCRIPTION] {
            let path = templates_dir.join(format!("{}.tera", name));
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            match engine.add_template(name, &content) {
                Ok(()) => log::info!("[TemplateEngine] Using project template {:?}", path),
                Err(e) => log::warn!("[TemplateEngine] Ignoring {:?}: {}", path, e),
            }
        }

        engine
    }

    /// Add or replace a template
    pub fn add_template(&mut self, name: &str, content: &str) -> Result<(), TemplateError> {
        self.tera
            .add_raw_template(name, content)
            .map_err(|e| TemplateError::Parse {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Render a template with any serializable context
    pub fn render(&self, name: &str, context: &impl Serialize) -> Result<String, TemplateError> {
        let render_error = |e: tera::Error| TemplateError::Render {
            name: name.to_string(),
            message: format!("{:?}", e),
        };

        let context = Context::from_serialize(context).map_err(render_error)?;
        self.tera.render(name, &context).map_err(render_error)
    }

    pub fn render_commit_message(
        &self,
        context: &CommitMessageContext,
    ) -> Result<String, TemplateError> {
        self.render(builtin::COMMIT_MESSAGE, context)
    }

    pub fn render_merge_request(
        &self,
        context: &MergeRequestContext,
    ) -> Result<String, TemplateError> {
        self.render(builtin::MERGE_REQUEST_DESCRIPTION, context)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
