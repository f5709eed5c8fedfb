use anyhow::{Context as _, bail};
use regex::{Captures, Regex};

/// `{{ scope.NAME }}` with an optional `| default("value")`
const PLACEHOLDER: &str = r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#;

/// Expand `{{ env.VAR }}` placeholders in raw configuration text
///
/// `{{ env.VAR | default("value") }}` falls back to `value` when `VAR` is
/// unset. Comment lines are copied as is, so placeholders in commented-out
/// settings never need their variables to exist.
pub fn expand_env(input: &str) -> anyhow::Result<String> {
    let placeholder = Regex::new(PLACEHOLDER).context("invalid placeholder pattern")?;
    let mut output = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let mut copied = 0;
        for captures in placeholder.captures_iter(line) {
            let Some(whole) = captures.get(0) else {
                continue;
            };

            output.push_str(&line[copied..whole.start()]);
            output.push_str(&resolve(&captures)?);
            copied = whole.end();
        }
        output.push_str(&line[copied..]);
    }

    Ok(output)
}

/// Value of one placeholder
fn resolve(captures: &Captures<'_>) -> anyhow::Result<String> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let default = captures.get(2).map(|m| m.as_str());

    let Some(var) = key.strip_prefix("env.").filter(|var| !var.is_empty() && !var.contains('.')) else {
        bail!("only variables scoped with 'env.' are supported: `{key}`");
    };

    match (std::env::var(var), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => bail!("environment variable not found: `{var}`"),
    }
}
