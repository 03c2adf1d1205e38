// Built-in commit message and merge request templates

use std::collections::HashMap;

/// Built-in template names
pub const COMMIT_MESSAGE: &str = "commit_message";
pub const MERGE_REQUEST_DESCRIPTION: &str = "merge_request_description";

/// Get all built-in templates
pub fn get_builtin_templates() -> HashMap<String, String> {
    let mut templates = HashMap::new();

    templates.insert(
        COMMIT_MESSAGE.to_string(),
        COMMIT_MESSAGE_TEMPLATE.to_string(),
    );
    templates.insert(
        MERGE_REQUEST_DESCRIPTION.to_string(),
        MERGE_REQUEST_DESCRIPTION_TEMPLATE.to_string(),
    );

    templates
}

/// Conventional-commit message for the session's work
pub const COMMIT_MESSAGE_TEMPLATE: &str = r#"{{ agent_type }}: {{ task_title }}

- Implemented by AI Agent {{ agent_id }}
- Files modified: {{ files_modified }}
- Tests added/updated: {{ tests_run }}
{% if quality_passed -%}
- Automated quality assurance passed
{% else -%}
- Automated quality assurance reported issues
{% endif -%}
- Ready for integration to {{ target_branch }} branch
"#;

/// Body of the merge request artifact
pub const MERGE_REQUEST_DESCRIPTION_TEMPLATE: &str = r#"## AI Agent Development Summary

**Agent ID**: {{ agent_id }}
**Execution Time**: {{ execution_minutes }} minutes
**Branch**: {{ branch }} -> {{ target_branch }}
{% if commit_id %}**Commit**: {{ commit_id }}
{% endif %}
### Performance Metrics
- Files Analyzed: {{ files_analyzed }}
- Files Modified: {{ files_modified }}
- Tests Run: {{ tests_run }}
- Commits Made: {{ commits_made }}
- Conflicts Resolved: {{ conflicts_resolved }}

### Quality Assurance
- [{% if analysis_passed %}x{% else %} {% endif %}] Static analysis passed
- [{% if tests_failed == 0 %}x{% else %} {% endif %}] All tests passing ({{ tests_passed }} passed, {{ tests_failed }} failed)
- [{% if format_applied %}x{% else %} {% endif %}] Code formatting applied
{% for finding in findings %}  - {{ finding }}
{% endfor %}
### Implementation Details
{{ task_description }}

### Integration Status
- [{% if conflicts_checked %}x{% else %} {% endif %}] Checked against {{ target_branch }}
- [{% if conflicts_clear %}x{% else %} {% endif %}] No unresolved merge conflicts
- [{% if ready_for_review %}x{% else %} {% endif %}] Ready for review
"#;
