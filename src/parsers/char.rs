use super::support::run_parse_loop;
use crate::error::Result;
use crate::sink::{SinkKind, Value};
use crate::storage::IteratorHolder;
use crate::typing::{GlobalContext, Parser, ParserContext, ParserGroup};

/// Accepts a cell only if it holds exactly one Unicode scalar value.
pub struct CharParser;

fn parse_char(text: &[u8]) -> Option<char> {
    let s = std::str::from_utf8(text).ok()?;
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some(c)
}

impl Parser for CharParser {
    fn name(&self) -> &'static str {
        "char"
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::Char
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::Char
    }
    fn tokenizes(&self, text: &[u8]) -> bool {
        parse_char(text).is_some()
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
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::Char('\0'), |bytes| {
            parse_char(bytes).map(Value::Char)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_multi_character_text() {
        assert!(parse_char(b"a").is_some());
        assert!(parse_char(b"ab").is_none());
        assert!(parse_char(b"").is_none());
    }
}
