use super::support::{run_parse_loop, trimmed_str};
use crate::error::Result;
use crate::sink::{SinkKind, Value};
use crate::storage::IteratorHolder;
use crate::typing::{GlobalContext, Parser, ParserContext, ParserGroup};

pub struct BooleanParser;

fn parse_bool(text: &[u8]) -> Option<bool> {
    match trimmed_str(text)? {
        s if s.eq_ignore_ascii_case("true") => Some(true),
        s if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

impl Parser for BooleanParser {
    fn name(&self) -> &'static str {
        "boolean"
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::Boolean
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::Bool
    }
    fn tokenizes(&self, text: &[u8]) -> bool {
        parse_bool(text).is_some()
    }
    fn try_parse(
        &self,
        global: &GlobalContext,
        ctx: &mut ParserContext,
        iter: &mut IteratorHolder,
        begin: usize,
        end: usize,
        appending: bool,
    ) -> Result<usize> {
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::Bool(false), |bytes| {
            parse_bool(bytes).map(Value::Bool)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_case_insensitive_true_false() {
        assert!(parse_bool(b"TRUE") == Some(true));
        assert!(parse_bool(b"false") == Some(false));
        assert!(parse_bool(b"yes").is_none());
    }
}
