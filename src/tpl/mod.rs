pub mod ast;
pub mod engine;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod render_context;
mod tags;
