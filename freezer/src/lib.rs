// freezer — input freezing and cutting resolver
//
// Library root. Parses input override text, reconciles it against a graph's
// declared inputs, and splices the graph accordingly.

pub mod ast;
pub mod diag;
pub mod dot;
pub mod engine;
pub mod error;
pub mod graph;
pub mod infer;
pub mod lexer;
pub mod model;
pub mod options;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod splice;
pub mod tensor;
pub mod validate;
