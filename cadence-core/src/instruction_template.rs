use crate::{CadenceError, CallbackContext, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Matches template placeholders like {variable} or {artifact.file_name}.
static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| Regex::new(r"\{+[^{}]*\}+").expect("Invalid regex pattern"))
}

/// Must start with a letter or underscore, followed by letters, digits, or
/// underscores.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_alphabetic() && first != '_' {
        return false;
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// A plain identifier or one prefixed with `app:`, `user:`, or `temp:`.
fn is_valid_state_name(var_name: &str) -> bool {
    let parts: Vec<&str> = var_name.split(':').collect();
    match parts.len() {
        1 => is_identifier(var_name),
        2 => {
            matches!(parts[0], "app" | "user" | "temp") && is_identifier(parts[1])
        }
        _ => false,
    }
}

/// Handles {var}, {var?}, and {artifact.name} syntax.
async fn replace_match(ctx: &dyn CallbackContext, match_str: &str) -> Result<String> {
    let var_name = match_str.trim_matches(|c| c == '{' || c == '}').trim();

    let (var_name, optional) = match var_name.strip_suffix('?') {
        Some(name) => (name, true),
        None => (var_name, false),
    };

    if let Some(file_name) = var_name.strip_prefix("artifact.") {
        let artifacts = ctx
            .artifacts()
            .ok_or_else(|| CadenceError::Agent("Artifact service is not initialized".to_string()))?;

        match artifacts.load(file_name).await {
            Ok(part) => Ok(part.text().unwrap_or_default().to_string()),
            Err(e) => {
                if optional {
                    Ok(String::new())
                } else {
                    Err(CadenceError::Agent(format!("Failed to load artifact {file_name}: {e}")))
                }
            }
        }
    } else if is_valid_state_name(var_name) {
        match ctx.state_get(var_name) {
            Some(value) => match value {
                serde_json::Value::String(s) => Ok(s),
                other => Ok(other.to_string()),
            },
            None => {
                if optional {
                    Ok(String::new())
                } else {
                    Err(CadenceError::Agent(format!("State variable '{var_name}' not found")))
                }
            }
        }
    } else {
        // Not a valid variable name; keep the original text as a literal.
        Ok(match_str.to_string())
    }
}

/// Injects session state and artifact values into an instruction template.
///
/// Placeholder syntax:
/// - `{var_name}` — required session state variable (errors if missing)
/// - `{var_name?}` — optional variable (empty string if missing)
/// - `{artifact.file_name}` — artifact content insertion
/// - `{app:var}`, `{user:var}`, `{temp:var}` — prefixed state variables
pub async fn inject_session_state(ctx: &dyn CallbackContext, template: &str) -> Result<String> {
    let regex = get_placeholder_regex();
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for found in regex.find_iter(template) {
        let range = found.range();
        result.push_str(&template[last_end..range.start]);
        let replacement = replace_match(ctx, found.as_str()).await?;
        result.push_str(&replacement);
        last_end = range.end;
    }

    result.push_str(&template[last_end..]);
    Ok(result)
}
