use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use log::{debug, trace};

use crate::Result;
use crate::data::value::Value;
use crate::error::TemplateError;

mod array;
mod date;
mod math;
mod string;

/// A filter body: `(input, arguments) -> output`.
pub type FilterFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;

/// A named pure transformation with a declared arity.
#[derive(Clone)]
pub struct Filter {
    pub name: String,
    pub min_args: usize,
    pub max_args: usize,
    func: FilterFn,
}

impl Filter {
    /// Checks the argument count, then runs the filter.
    pub fn apply(&self, input: &Value, args: &[Value]) -> Result<Value> {
        if args.len() < self.min_args || args.len() > self.max_args {
            let expected = if self.min_args == self.max_args {
                format!("{}", self.min_args)
            } else {
                format!("{} to {}", self.min_args, self.max_args)
            };
            return Err(TemplateError::Eval(format!(
                "filter '{}' expects {} argument(s), got {}",
                self.name,
                expected,
                args.len()
            )));
        }
        (self.func)(input, args)
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

/// The process-wide filter registry, populated with the standard filters on
/// first use.
pub static FILTERS: LazyLock<FilterRegistry> = LazyLock::new(FilterRegistry::with_standard);

/// Registers `func` under `name` in the global registry. Registering a name
/// twice replaces the earlier filter (last write wins).
pub fn register_filter<F>(name: &str, min_args: usize, max_args: usize, func: F)
where
    F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
{
    FILTERS.register(name, min_args, max_args, func);
}

/// A thread-safe map of filters by name.
///
/// Meant to be filled at startup and read during rendering; concurrent
/// registration is memory safe but makes lookups racy.
pub struct FilterRegistry {
    filters: DashMap<String, Arc<Filter>>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            filters: DashMap::new(),
        }
    }

    /// Creates a registry holding the standard filter set.
    pub fn with_standard() -> Self {
        let registry = Self::new();
        string::install(&registry);
        array::install(&registry);
        math::install(&registry);
        date::install(&registry);
        debug!("filter registry initialized with {} filters", registry.len());
        registry
    }

    pub fn register<F>(&self, name: &str, min_args: usize, max_args: usize, func: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let filter = Filter {
            name: name.to_string(),
            min_args,
            max_args: max_args.max(min_args),
            func: Arc::new(func),
        };
        if self.filters.insert(name.to_string(), Arc::new(filter)).is_some() {
            debug!("filter '{}' replaced", name);
        } else {
            trace!("filter '{}' registered", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Filter>> {
        self.filters.get(name).map(|f| f.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Applies filter `name`; an unknown name is an `Eval` error.
    pub fn apply(&self, name: &str, input: &Value, args: &[Value]) -> Result<Value> {
        // Clone the Arc out so no map shard stays locked while the filter runs.
        let filter = self
            .get(name)
            .ok_or_else(|| TemplateError::Eval(format!("unknown filter '{}'", name)))?;
        filter.apply(input, args)
    }
}

static NIL: Value = Value::Nil;

/// Positional argument `i`, `Nil` when absent.
pub(crate) fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&NIL)
}
