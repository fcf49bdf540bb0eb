use crate::Result;
use crate::data::value::{ToValue, Value};
use crate::options::Options;
use crate::tpl::ast::Node;
use crate::tpl::lexer::tokenize;
use crate::tpl::parser::parse_tokens;
use crate::tpl::render::{Renderer, TemplateSource};
use log::debug;

/// A parsed template, ready to be rendered any number of times.
///
/// Parsing happens once; each render call owns its context, so a `Template`
/// can be shared across threads and rendered concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    root: Node,
}

impl Template {
    /// Parses `source` with default [`Options`].
    pub fn parse(source: &str) -> Result<Self> {
        Self::parse_with(source, &Options::default())
    }

    pub fn parse_with(source: &str, options: &Options) -> Result<Self> {
        let root = parse_tokens(tokenize(source), options)?;
        debug!("parsed template ({} bytes)", source.len());
        Ok(Self { root })
    }

    /// The root `Block` node.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Renders against `data` with default options and no partials.
    pub fn render<T: ToValue + ?Sized>(&self, data: &T) -> Result<String> {
        self.render_with(&data.to_value(), &Options::default(), None)
    }

    /// Renders against an already built `Value`, resolving `include` and
    /// `render` tags through `source`.
    pub fn render_with(
        &self,
        data: &Value,
        options: &Options,
        source: Option<&dyn TemplateSource>,
    ) -> Result<String> {
        Renderer::new(data, options, source).render(&self.root)
    }
}

/// Parses `source` into its root node.
pub fn parse(source: &str) -> Result<Node> {
    parse_tokens(tokenize(source), &Options::default())
}

/// One-shot parse and render.
pub fn render_template<T: ToValue + ?Sized>(source: &str, data: &T) -> Result<String> {
    Template::parse(source)?.render(data)
}
