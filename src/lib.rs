//! A Liquid-style template engine.
//!
//! ```
//! use uliquid::{Template, to_value};
//! use std::collections::BTreeMap;
//!
//! let mut data = BTreeMap::new();
//! data.insert("name".to_string(), "World");
//! let tpl = Template::parse("Hello {{ name | upcase }}!").unwrap();
//! assert_eq!(tpl.render(&to_value(&data).unwrap()).unwrap(), "Hello WORLD!");
//! ```

pub mod data;
pub mod environment;
pub mod error;
pub mod filters;
pub mod options;
pub mod template_loader;
pub mod tpl;

pub use data::{ToValue, Value, to_value};
pub use environment::Environment;
pub use error::{Error, Position, TemplateError};
pub use filters::{FILTERS, register_filter};
pub use options::Options;
pub use tpl::engine::{Template, parse, render_template};
pub use tpl::render::{TemplateSource, render};

pub type Result<T> = std::result::Result<T, Error>;
