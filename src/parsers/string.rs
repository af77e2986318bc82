use super::support::run_parse_loop;
use crate::error::Result;
use crate::sink::{SinkKind, Value};
use crate::storage::IteratorHolder;
use crate::typing::{GlobalContext, Parser, ParserContext, ParserGroup};

/// The ladder's universal fallback: always accepts, copying raw bytes
/// verbatim (lossily, for non-UTF-8 input) into an owned `String`.
pub struct StringParser;

impl Parser for StringParser {
    fn name(&self) -> &'static str {
        "string"
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::String
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::Utf8
    }
    fn tokenizes(&self, _text: &[u8]) -> bool {
        true
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
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::Utf8(String::new()), |bytes| {
            Some(Value::Utf8(String::from_utf8_lossy(bytes).into_owned()))
        })
    }
}
