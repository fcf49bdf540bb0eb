/// Limits applied while parsing and rendering.
///
/// Template authors can express unbounded nesting and loops, so every parse and
/// render call is bounded by these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Maximum nesting of block tags, includes and chained operators.
    pub max_depth: usize,
    /// Maximum number of loop iterations across a whole render call.
    pub max_iterations: usize,
}

pub const DEFAULT_MAX_DEPTH: usize = 100;
pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

impl Default for Options {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let opts = Options::new().max_depth(8);
        assert_eq!(opts.max_depth, 8);
        assert_eq!(opts.max_iterations, DEFAULT_MAX_ITERATIONS);
    }
}
