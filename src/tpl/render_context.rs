use crate::data::value::Value;
use crate::options::DEFAULT_MAX_ITERATIONS;
use std::collections::HashMap;

pub type Scope = HashMap<String, Value>;

/// Data visible to variable lookups during one render call: the caller's data
/// (never modified), the `increment`/`decrement` counters, and a stack of
/// local scopes pushed by loops, includes and top-level assigns.
pub struct Context<'a> {
    root: &'a Value,
    scopes: Vec<Scope>,
    counters: Scope,
    /// Upper bound on the length of a materialized `(a..b)` range.
    pub(crate) max_range: usize,
}

impl<'a> Context<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            scopes: Vec::new(),
            counters: Scope::new(),
            max_range: DEFAULT_MAX_ITERATIONS + 1,
        }
    }

    pub fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Binds `name` in the innermost scope, creating a top-level scope when none exists.
    pub fn assign(&mut self, name: &str, value: Value) {
        if self.scopes.is_empty() {
            self.scopes.push(Scope::new());
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// Advances counter `name` (starting at 0) by `step` and returns the value
    /// to output: `increment` shows the value before the step, `decrement`
    /// the value after it.
    pub fn step_counter(&mut self, name: &str, step: i64) -> i64 {
        let counter = self
            .counters
            .entry(name.to_string())
            .or_insert(Value::Int(0));
        let before = counter.as_i64().unwrap_or(0);
        let after = before.saturating_add(step);
        *counter = Value::Int(after);
        if step < 0 { after } else { before }
    }

    /// Looks up a top-level name: innermost scope first, then counters, then
    /// the root data.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.scopes.iter().rev().find_map(|scope| scope.get(key)) {
            return Some(v);
        }
        if let Some(v) = self.counters.get(key) {
            return Some(v);
        }
        match self.root {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn root() -> Value {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        Value::Map(map)
    }

    #[test]
    fn test_lookup_simple() {
        let root = root();
        let ctx = Context::new(&root);

        assert_eq!(ctx.lookup("a"), Some(&Value::Int(1)));
        assert_eq!(ctx.lookup("b"), None);
    }

    #[test]
    fn test_lookup_locals_shadowing() {
        let root = root();
        let mut ctx = Context::new(&root);

        let mut scope = Scope::new();
        scope.insert("a".to_string(), Value::Int(2));
        ctx.push_scope(scope);
        assert_eq!(ctx.lookup("a"), Some(&Value::Int(2)));

        ctx.pop_scope();
        assert_eq!(ctx.lookup("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_assign_creates_scope_once() {
        let root = root();
        let mut ctx = Context::new(&root);
        ctx.assign("x", Value::Int(5));
        ctx.assign("y", Value::Int(6));
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.lookup("x"), Some(&Value::Int(5)));
        // The caller's data is untouched.
        assert_eq!(root.as_map().map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_non_map_root_has_no_names() {
        let root = Value::List(vec![Value::Int(1)]);
        let ctx = Context::new(&root);
        assert_eq!(ctx.lookup("a"), None);
    }

    #[test]
    fn test_counters_shadow_data_but_not_assigns() {
        let root = root();
        let mut ctx = Context::new(&root);
        assert_eq!(ctx.step_counter("a", 1), 0);
        assert_eq!(ctx.step_counter("a", 1), 1);
        assert_eq!(ctx.lookup("a"), Some(&Value::Int(2)));
        assert_eq!(ctx.step_counter("d", -1), -1);

        ctx.assign("a", Value::from("local"));
        assert_eq!(ctx.lookup("a"), Some(&Value::from("local")));
    }
}
