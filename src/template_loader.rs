use crate::Result;
use crate::environment::Environment;
use crate::error::TemplateError;
use crate::tpl::engine::Template;
use glob::glob;
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Loads every file matching `pattern` into `env`, naming each template by its
/// file stem (`partials/card.liquid` → `card`).
///
/// The whole batch is read and parsed before anything is registered, so a
/// failing file leaves `env` untouched. Returns the number of templates loaded.
pub fn load(env: &Environment, pattern: &str) -> Result<usize> {
    let paths = glob(pattern).map_err(|e| {
        TemplateError::TemplateLoadError(format!("invalid glob pattern '{}': {}", pattern, e))
    })?;

    let mut batch: HashMap<String, (String, Template)> = HashMap::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            TemplateError::TemplateLoadError(format!("cannot read path for '{}': {}", pattern, e))
        })?;
        if !path.is_file() {
            continue;
        }
        let (name, template) = load_file(env, &path)?;
        let source = path.display().to_string();
        if let Some((previous, _)) = batch.get(&name) {
            return Err(TemplateError::TemplateLoadError(format!(
                "duplicate template name '{}' ({} and {})",
                name, previous, source
            )));
        }
        batch.insert(name, (source, template));
    }

    let count = batch.len();
    for (name, (source, template)) in batch {
        debug!("loaded template '{}' from {}", name, source);
        env.add_template(&name, template);
    }
    Ok(count)
}

/// Registers in-memory `(name, source)` pairs, e.g. templates embedded with
/// `include_str!`.
pub fn load_assets(env: &Environment, assets: &[(&str, &str)]) -> Result<usize> {
    let mut parsed = Vec::with_capacity(assets.len());
    for (name, source) in assets {
        let template = Template::parse_with(source, env.options()).map_err(|e| {
            TemplateError::TemplateLoadError(format!("failed to parse '{}': {}", name, e))
        })?;
        parsed.push((*name, template));
    }
    let count = parsed.len();
    for (name, template) in parsed {
        env.add_template(name, template);
    }
    Ok(count)
}

fn load_file(env: &Environment, path: &Path) -> Result<(String, Template)> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            TemplateError::TemplateLoadError(format!(
                "cannot derive a template name from {}",
                path.display()
            ))
        })?
        .to_string();
    let source = fs::read_to_string(path).map_err(|e| {
        TemplateError::TemplateLoadError(format!("failed to read {}: {}", path.display(), e))
    })?;
    let template = Template::parse_with(&source, env.options()).map_err(|e| {
        TemplateError::TemplateLoadError(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok((name, template))
}
