//! Mapping language parser
//!
//! Compiles mapping text into executable node trees. Function and method
//! names are resolved against a [`ParsingContext`], which decides what a
//! mapping is allowed to call.

pub mod context;
pub mod error;
pub mod pratt;
pub mod span;
pub mod statement;
pub mod tokenizer;

use std::sync::Arc;

use log::debug;

pub use context::ParsingContext;
pub use error::{ParseError, ParseResult};
pub use pratt::{PrattParser, Precedence};
pub use span::{Spanned, line_col};
pub use tokenizer::{Token, Tokenizer};

use crate::mapping::Mapping;
use crate::query::{FunctionRef, NamedMappings};

/// Compile a mapping.
///
/// The returned mapping carries the context's named mappings plus any
/// declared with `map` in the text.
pub fn parse_mapping(ctx: &ParsingContext, name: &str, text: &str) -> ParseResult<Mapping> {
    let mut parser = PrattParser::new(text, ctx)?;
    let statements = parser.parse_mapping_body()?;

    let mut maps = NamedMappings::clone(ctx.maps());
    maps.extend(parser.declared_maps);

    debug!(
        "compiled mapping '{}': {} statements, {} named maps",
        name,
        statements.len(),
        maps.len()
    );
    Ok(Mapping::new(name, statements, Arc::new(maps)))
}

/// Compile a single query expression
pub fn parse_query(ctx: &ParsingContext, text: &str) -> ParseResult<FunctionRef> {
    let mut parser = PrattParser::new(text, ctx)?;
    let query = parser.parse_expression()?;
    if !parser.is_at_end() {
        return Err(parser.unexpected("end of input"));
    }
    Ok(query)
}
