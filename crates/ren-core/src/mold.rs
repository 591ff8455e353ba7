//! Minimal value renderer (spec §11).
//!
//! The full `mold`/`form` string-encoding facility (round-trippable literal syntax for
//! every datatype, load-bearing pretty-printing options) is out of scope (spec §12) — what
//! *is* needed is something [`crate::error::CodeLoc::near`] and [`crate::tracer::RecordingTracer`]
//! display can call to turn an arbitrary cell into readable text. `mold_to` quotes text
//! values and decorates word-shaped kinds the way source syntax would; `form_to` is the
//! same walk without molding's quoting, matching the spec's own mold-vs-form distinction.

use crate::{
    cell::{Cell, Kind, Payload},
    series::SeriesId,
    Engine,
};

/// Renders `cell` the way it would need to be typed back in as source (spec §11 "mold").
#[must_use]
pub fn mold_to(engine: &Engine, cell: Cell) -> String {
    render(engine, cell, true)
}

/// Renders `cell` for human display — text values unquoted (spec §11 "form").
#[must_use]
pub fn form_to(engine: &Engine, cell: Cell) -> String {
    render(engine, cell, false)
}

fn render(engine: &Engine, cell: Cell, quote_strings: bool) -> String {
    let quotes = cell.quote_level();
    let body = render_unquoted(engine, cell, quote_strings);
    if quotes == 0 {
        body
    } else {
        format!("{}{body}", "'".repeat(quotes as usize))
    }
}

fn render_unquoted(engine: &Engine, cell: Cell, quote_strings: bool) -> String {
    match cell.kind() {
        Kind::Integer => match cell.payload() {
            Payload::Int(v) => v.to_string(),
            _ => unreachable!("integer cell without int payload"),
        },
        Kind::Decimal => match cell.payload() {
            Payload::Decimal(v) => {
                if v.fract() == 0.0 {
                    format!("{v:.1}")
                } else {
                    v.to_string()
                }
            }
            _ => unreachable!("decimal cell without decimal payload"),
        },
        Kind::Logic => match cell.payload() {
            Payload::Logic(true) => "true".to_string(),
            Payload::Logic(false) => "false".to_string(),
            _ => unreachable!("logic cell without logic payload"),
        },
        Kind::Blank => "_".to_string(),
        Kind::Null => "#(null)".to_string(),
        Kind::Void | Kind::End => String::new(),
        Kind::Word => word_text(engine, cell),
        Kind::SetWord => format!("{}:", word_text(engine, cell)),
        Kind::GetWord => format!(":{}", word_text(engine, cell)),
        Kind::LitWord => format!("'{}", word_text(engine, cell)),
        Kind::Refinement => format!("/{}", word_text(engine, cell)),
        Kind::Issue => format!("#{}", word_text(engine, cell)),
        Kind::Tag => format!("<{}>", word_text(engine, cell)),
        Kind::Block => mold_array(engine, series_of(cell), "[", "]", quote_strings),
        Kind::Group => mold_array(engine, series_of(cell), "(", ")", quote_strings),
        Kind::Path => mold_path(engine, series_of(cell), "", ""),
        Kind::SetPath => mold_path(engine, series_of(cell), "", ":"),
        Kind::GetPath => mold_path(engine, series_of(cell), ":", ""),
        Kind::Text => {
            let text = decode_text(engine, series_of(cell));
            if quote_strings {
                format!("{text:?}")
            } else {
                text
            }
        }
        Kind::Binary => {
            let bytes: Vec<String> = engine
                .series
                .get(series_of(cell))
                .as_slice()
                .iter()
                .map(|c| match c.payload() {
                    Payload::Int(v) => format!("{:02x}", v as u8),
                    _ => "??".to_string(),
                })
                .collect();
            format!("#{{{}}}", bytes.join(""))
        }
        Kind::Datatype => match cell.payload() {
            Payload::Datatype(k) => format!("{k}!"),
            _ => unreachable!("datatype cell without datatype payload"),
        },
        Kind::Action => "#[action!]".to_string(),
        Kind::Frame => "#[frame!]".to_string(),
        Kind::Object => "#[object!]".to_string(),
        Kind::Error => "#[error!]".to_string(),
        Kind::Port => "#[port!]".to_string(),
        Kind::Map => "#[map!]".to_string(),
        Kind::Typeset => "#[typeset!]".to_string(),
        Kind::Varargs => "#[varargs!]".to_string(),
        Kind::Handle => "#[handle!]".to_string(),
    }
}

fn series_of(cell: Cell) -> SeriesId {
    match cell.payload() {
        Payload::Series(id) => id,
        _ => unreachable!("series-backed kind without a series payload"),
    }
}

fn word_text(engine: &Engine, cell: Cell) -> String {
    match cell.payload() {
        Payload::Symbol(sym) => engine.interner.resolve(sym).to_string(),
        _ => unreachable!("word-like cell without a symbol payload"),
    }
}

fn mold_array(engine: &Engine, id: SeriesId, open: &str, close: &str, quote_strings: bool) -> String {
    let cells: Vec<Cell> = engine.series.get(id).as_slice().to_vec();
    let parts: Vec<String> = cells.into_iter().map(|c| render(engine, c, quote_strings)).collect();
    format!("{open}{}{close}", parts.join(" "))
}

fn mold_path(engine: &Engine, id: SeriesId, prefix: &str, suffix: &str) -> String {
    let cells: Vec<Cell> = engine.series.get(id).as_slice().to_vec();
    let parts: Vec<String> = cells.into_iter().map(|c| render(engine, c, false)).collect();
    format!("{prefix}{}{suffix}", parts.join("/"))
}

/// Decodes a text series (an array of `Integer`-kind codepoint cells, spec §11) back into
/// a Rust string, skipping anything malformed rather than failing the whole render.
fn decode_text(engine: &Engine, id: SeriesId) -> String {
    engine
        .series
        .get(id)
        .as_slice()
        .iter()
        .filter_map(|c| match c.payload() {
            Payload::Int(cp) => u32::try_from(cp).ok().and_then(char::from_u32),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Flavor;

    #[test]
    fn molds_integers_and_words() {
        let mut engine = Engine::new_for_test();
        assert_eq!(mold_to(&engine, Cell::integer(42)), "42");
        let sym = engine.interner.intern("foo");
        assert_eq!(mold_to(&engine, Cell::word(sym)), "foo");
        assert_eq!(mold_to(&engine, Cell::set_word(sym)), "foo:");
    }

    #[test]
    fn molds_text_quoted_forms_unquoted() {
        let mut engine = Engine::new_for_test();
        let cells: Vec<Cell> = "hi".chars().map(|c| Cell::integer(c as i64)).collect();
        let id = engine.series.make_array(cells, Flavor::Plain);
        let text = Cell::text(id);
        assert_eq!(mold_to(&engine, text), "\"hi\"");
        assert_eq!(form_to(&engine, text), "hi");
    }

    #[test]
    fn molds_blocks_recursively() {
        let mut engine = Engine::new_for_test();
        let inner = engine.series.make_array(vec![Cell::integer(1), Cell::integer(2)], Flavor::Plain);
        let block = Cell::block(inner);
        assert_eq!(mold_to(&engine, block), "[1 2]");
    }
}
