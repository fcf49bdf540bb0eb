use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};

use crate::Result;
use crate::data::value::ToValue;
use crate::error::TemplateError;
use crate::options::Options;
use crate::tpl::engine::Template;
use crate::tpl::render::TemplateSource;

/// A registry of named templates.
///
/// Templates registered here can be rendered by name and are visible to
/// `include` / `render` tags of every template rendered through the same
/// environment.
pub struct Environment {
    /// Parsed templates by name.
    templates: DashMap<String, Arc<Template>>,
    options: Options,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Creates an empty environment with default [`Options`].
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            templates: DashMap::new(),
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Registers a parsed template. Re-using a name replaces the earlier template.
    pub fn add_template(&self, name: &str, template: Template) {
        if self
            .templates
            .insert(name.to_string(), Arc::new(template))
            .is_some()
        {
            warn!("template '{}' redefined", name);
        }
    }

    /// Parses `source` with this environment's options and registers it.
    pub fn add_template_str(&self, name: &str, source: &str) -> Result<()> {
        let template = Template::parse_with(source, &self.options)?;
        self.add_template(name, template);
        Ok(())
    }

    /// Loads template files matching a glob pattern (e.g. `"templates/**/*.liquid"`),
    /// named by file stem.
    ///
    /// # Errors
    /// Returns `TemplateLoadError` on a bad pattern, an unreadable or
    /// unparseable file, or two files with the same stem.
    pub fn assets(&self, pattern: &str) -> Result<usize> {
        crate::template_loader::load(self, pattern)
    }

    pub fn get_template(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.get(name).map(|t| t.value().clone())
    }

    pub fn remove_template(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.remove(name).map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Renders the template registered as `name`.
    pub fn render<T: ToValue + ?Sized>(&self, name: &str, data: &T) -> Result<String> {
        let template = self
            .get_template(name)
            .ok_or_else(|| TemplateError::TemplateNotFound(name.to_string()))?;
        debug!("rendering template '{}'", name);
        template.render_with(&data.to_value(), &self.options, Some(self))
    }

    /// Parses and renders `source` once, resolving partials from this environment.
    pub fn render_str<T: ToValue + ?Sized>(&self, source: &str, data: &T) -> Result<String> {
        let template = Template::parse_with(source, &self.options)?;
        template.render_with(&data.to_value(), &self.options, Some(self))
    }
}

impl TemplateSource for Environment {
    fn get_template(&self, name: &str) -> Option<Arc<Template>> {
        Environment::get_template(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_render_by_name() {
        let env = Environment::new();
        env.add_template_str("hello", "Hello {{ name }}!").unwrap();
        let mut data = HashMap::new();
        data.insert("name".to_string(), "World");
        assert_eq!(env.render("hello", &data).unwrap(), "Hello World!");
    }

    #[test]
    fn test_missing_template() {
        let env = Environment::new();
        let err = env.render("nope", &()).unwrap_err();
        assert_eq!(err, TemplateError::TemplateNotFound("nope".to_string()));
    }

    #[test]
    fn test_partials_resolve_through_environment() {
        let env = Environment::new();
        env.add_template_str("item", "<{{ x }}>").unwrap();
        let out = env
            .render_str("{% for x in (1..3) %}{% include 'item' %}{% endfor %}", &())
            .unwrap();
        assert_eq!(out, "<1><2><3>");
    }

    #[test]
    fn test_redefine_and_remove() {
        let env = Environment::new();
        env.add_template_str("t", "a").unwrap();
        env.add_template_str("t", "b").unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env.render("t", &()).unwrap(), "b");
        assert!(env.remove_template("t").is_some());
        assert!(env.is_empty());
    }

    #[test]
    fn test_options_apply_to_parsing() {
        let env = Environment::with_options(Options::new().max_depth(2));
        let err = env
            .add_template_str("deep", "{% if a %}{% if b %}{% if c %}x{% endif %}{% endif %}{% endif %}")
            .unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }
}
