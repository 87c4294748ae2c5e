//! Free-text filter parsing.
//!
//! Input such as `materiales > 500€, area < 50m2` is split into segments and
//! each segment runs through four ordered rule tables: field aliases, then
//! operators, then units, then value shapes. Every table is evaluated top to
//! bottom and the first hit wins, so precedence is the table order.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

use crate::filter::{FilterCondition, FilterOperator, FilterValue, Scalar, UnitTag};
use crate::row::Field;

/// Segments this short (after trimming) are dropped silently instead of
/// being reported as unrecognized.
pub const MIN_NOISE_LEN: usize = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NlParse {
    pub filters: Vec<FilterCondition>,
    pub unrecognized: Vec<String>,
}

/// Field aliases, English and Spanish. Matched longest first.
const FIELD_ALIASES: &[(&str, Field)] = &[
    ("unit cost", Field::Cost),
    ("unit price", Field::Cost),
    ("cost", Field::Cost),
    ("costs", Field::Cost),
    ("price", Field::Cost),
    ("prices", Field::Cost),
    ("amount", Field::Cost),
    ("precio", Field::Cost),
    ("precios", Field::Cost),
    ("coste", Field::Cost),
    ("costo", Field::Cost),
    ("importe", Field::Cost),
    ("total cost", Field::Total),
    ("importe total", Field::Total),
    ("total", Field::Total),
    ("subtotal", Field::Total),
    ("quantity", Field::Quantity),
    ("qty", Field::Quantity),
    ("cantidad", Field::Quantity),
    ("area", Field::Area),
    ("área", Field::Area),
    ("surface", Field::Area),
    ("superficie", Field::Area),
    ("material", Field::Material),
    ("materials", Field::Material),
    ("material cost", Field::Material),
    ("materiales", Field::Material),
    ("labor", Field::Labor),
    ("labour", Field::Labor),
    ("labor cost", Field::Labor),
    ("mano de obra", Field::Labor),
    ("trabajo", Field::Labor),
    ("machine", Field::Machine),
    ("machines", Field::Machine),
    ("machinery", Field::Machine),
    ("equipment", Field::Machine),
    ("maquinaria", Field::Machine),
    ("máquinas", Field::Machine),
    ("maquinas", Field::Machine),
    ("category", Field::Category),
    ("categoría", Field::Category),
    ("categoria", Field::Category),
    ("type", Field::Category),
    ("tipo", Field::Category),
    ("unit", Field::Unit),
    ("uom", Field::Unit),
    ("unidad", Field::Unit),
    ("description", Field::Description),
    ("descripción", Field::Description),
    ("descripcion", Field::Description),
    ("name", Field::Description),
    ("nombre", Field::Description),
    ("id", Field::Id),
    ("code", Field::Id),
    ("rate code", Field::Id),
    ("código", Field::Id),
    ("codigo", Field::Id),
];

/// Symbolic operators, matched anywhere in the segment. Two-character
/// symbols come before their one-character prefixes.
const SYMBOL_RULES: &[(&str, FilterOperator)] = &[
    (r">=|=>|≥", FilterOperator::Gte),
    (r"<=|=<|≤", FilterOperator::Lte),
    (r"!=|<>|≠", FilterOperator::Neq),
    (r">", FilterOperator::Gt),
    (r"<", FilterOperator::Lt),
    (r"==|=", FilterOperator::Eq),
];

/// Word operators. Only recognized where the value starts, so words inside
/// a description (`cast in place`) stay part of the text.
const WORD_RULES: &[(&str, FilterOperator)] = &[
    (r"at least|al menos|no menos de|mínimo|minimo", FilterOperator::Gte),
    (r"at most|up to|como máximo|no más de|máximo|maximo", FilterOperator::Lte),
    (r"not|distinto de|diferente de", FilterOperator::Neq),
    (r"between|entre", FilterOperator::Between),
    (r"more than|greater than|over|above|mayor que|más de|mas de|superior a", FilterOperator::Gt),
    (r"less than|under|below|menor que|menos de|inferior a", FilterOperator::Lt),
    (r"equals?|is|igual a|es", FilterOperator::Eq),
    (r"contains?|contiene|like|includes?", FilterOperator::Contains),
    (r"in|en|one of|uno de", FilterOperator::In),
];

/// Unit patterns. Run on text where digits are already split from a
/// following unit (`50m2` → `50 m2`).
const UNIT_RULES: &[(&str, UnitTag)] = &[
    (r"€|\beur\b|\beuros?\b", UnitTag::Eur),
    (r"\$|\busd\b|\bdollars?\b|\bdólares\b", UnitTag::Usd),
    (r"£|\bgbp\b|\bpounds?\b", UnitTag::Gbp),
    (
        r"\bm²|\bm2\b|\bsqm\b|\bsq\.?\s?m\b|\bsquare met(?:er|re)s?\b|\bmetros cuadrados\b",
        UnitTag::SquareMeter,
    ),
    (
        r"\bkg\b|\bkilos?\b|\bkilogram(?:me)?s?\b|\bkilogramos?\b",
        UnitTag::Kilogram,
    ),
    (r"\bt\b|\btons?\b|\btonnes?\b|\btoneladas?\b", UnitTag::Tonne),
    (r"\bpcs\b|\bpieces?\b|\bpzas?\b|\buds?\b|\bunidades\b", UnitTag::Piece),
];

const NUMBER: &str = r"-?\d+(?:[.,]\d+)*";

struct Rules {
    fields: Vec<(Regex, Field)>,
    symbols: Vec<(Regex, FilterOperator)>,
    words: Vec<(Regex, FilterOperator)>,
    units: Vec<(Regex, UnitTag)>,
    range: Regex,
    number: Regex,
    between: Regex,
    conjunction: Regex,
    digit_unit: Regex,
    alternatives: Regex,
}

fn rules() -> Option<&'static Rules> {
    static RULES: OnceLock<Result<Rules, regex::Error>> = OnceLock::new();
    match RULES.get_or_init(build_rules) {
        Ok(rules) => Some(rules),
        Err(e) => {
            tracing::error!("filter rules failed to compile: {}", e);
            None
        }
    }
}

fn build_rules() -> Result<Rules, regex::Error> {
    let mut aliases: Vec<(&str, Field)> = FIELD_ALIASES.to_vec();
    // Stable: equal-length aliases keep table order.
    aliases.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.chars().count()));
    let fields = aliases
        .into_iter()
        .map(|(alias, field)| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(alias))).map(|re| (re, field))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let symbols = SYMBOL_RULES
        .iter()
        .map(|(p, op)| Regex::new(p).map(|re| (re, *op)))
        .collect::<Result<Vec<_>, _>>()?;
    let words = WORD_RULES
        .iter()
        .map(|(p, op)| Regex::new(&format!(r"(?i)^\s*(?:{})\b", p)).map(|re| (re, *op)))
        .collect::<Result<Vec<_>, _>>()?;
    let units = UNIT_RULES
        .iter()
        .map(|(p, unit)| Regex::new(&format!("(?i){}", p)).map(|re| (re, *unit)))
        .collect::<Result<Vec<_>, _>>()?;

    // Numbers must stand alone so codes like `c-1001` stay text.
    let start = r"(?:^|[\s=<>!≥≤≠$£€(:])";
    let end = r"(?:$|[\s$£€%)])";
    Ok(Rules {
        fields,
        symbols,
        words,
        units,
        range: Regex::new(&format!(
            r"(?i){start}({n})(?:\s*[-–]\s*|\s+(?:to|a|hasta|and|y)\s+)({n}){end}",
            start = start,
            n = NUMBER,
            end = end
        ))?,
        number: Regex::new(&format!(
            r"{start}({n}){end}",
            start = start,
            n = NUMBER,
            end = end
        ))?,
        between: Regex::new(&format!(
            r"(?i)\b(between|entre)\s+({n})\s+(?:and|y)\s+({n})",
            n = NUMBER
        ))?,
        conjunction: Regex::new(r"(?i)\s+(?:and|y|&)\s+")?,
        digit_unit: Regex::new(r"(\d)([\p{L}€$£²])")?,
        alternatives: Regex::new(r"(?i)\s*(?:\||/|\bor\b|\bo\b)\s*")?,
    })
}

/// Parses a number written with `.` or `,` as decimal or thousands separator.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let normalized = match (s.contains('.'), s.contains(',')) {
        (true, true) => {
            // The later separator is the decimal one.
            let dot = s.rfind('.').unwrap_or(0);
            let comma = s.rfind(',').unwrap_or(0);
            if dot > comma {
                s.replace(',', "")
            } else {
                s.replace('.', "").replace(',', ".")
            }
        }
        (false, true) => {
            let groups: Vec<&str> = s.split(',').collect();
            if groups.len() > 2 || groups[1..].iter().all(|g| g.len() == 3) {
                s.replace(',', "")
            } else {
                s.replace(',', ".")
            }
        }
        (true, false) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    };
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Splits on `;`, on `,` unless it sits between digits, and on and/y.
fn split_segments(rules: &Rules, text: &str) -> Vec<String> {
    let protected = rules.between.replace_all(text, "$1 $2 to $3");

    let chars: Vec<char> = protected.chars().collect();
    let mut pieces = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        let is_delimiter = match c {
            ';' => true,
            ',' => {
                let before = i > 0 && chars[i - 1].is_ascii_digit();
                let after = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
                !(before && after)
            }
            _ => false,
        };
        if is_delimiter {
            pieces.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    pieces.push(current);

    pieces
        .iter()
        .flat_map(|piece| rules.conjunction.split(piece).map(str::to_string))
        .collect()
}

fn cut(text: &mut String, span: Range<usize>) {
    text.replace_range(span, " ");
}

/// What one segment resolved to.
#[derive(Debug, Clone, PartialEq)]
struct SegmentParse {
    field: Option<Field>,
    operator: Option<FilterOperator>,
    unit: Option<UnitTag>,
    value: Option<FilterValue>,
}

fn parse_segment(rules: &Rules, segment: &str) -> SegmentParse {
    let lowered = segment.to_lowercase();
    let mut work = rules.digit_unit.replace_all(&lowered, "$1 $2").into_owned();

    let field = rules
        .fields
        .iter()
        .find_map(|(re, field)| re.find(&work).map(|m| (m.range(), *field)));
    let field = field.map(|(span, field)| {
        cut(&mut work, span);
        field
    });

    let operator = rules
        .symbols
        .iter()
        .chain(rules.words.iter())
        .find_map(|(re, op)| re.find(&work).map(|m| (m.range(), *op)));
    let operator = operator.map(|(span, op)| {
        cut(&mut work, span);
        op
    });

    // Units only qualify numbers; `unit m2` keeps `m2` as its value.
    let numeric_field = field.map_or(true, |f| f.is_numeric());
    let mut unit = None;
    for (re, tag) in rules.units.iter().filter(|_| numeric_field) {
        if let Some(m) = re.find(&work) {
            let span = m.range();
            unit = Some(*tag);
            cut(&mut work, span);
            break;
        }
    }

    let value = if operator == Some(FilterOperator::In) {
        extract_set(rules, &work)
    } else {
        extract_value(rules, &mut work)
    };
    SegmentParse {
        field,
        operator,
        unit,
        value,
    }
}

/// Range, then single number, then the cleaned remainder as text.
fn extract_value(rules: &Rules, work: &mut String) -> Option<FilterValue> {
    if let Some(caps) = rules.range.captures(work) {
        let lo = caps.get(1).and_then(|m| parse_number(m.as_str()));
        let hi = caps.get(2).and_then(|m| parse_number(m.as_str()));
        if let (Some(lo), Some(hi)) = (lo, hi) {
            return Some(FilterValue::Range(lo, hi));
        }
    }
    if let Some(caps) = rules.number.captures(work) {
        if let Some(n) = caps.get(1).and_then(|m| parse_number(m.as_str())) {
            return Some(FilterValue::Number(n));
        }
    }
    let cleaned: String = work
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c.is_ascii_punctuation() || c == '“' || c == '”')
        .trim()
        .to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(FilterValue::Text(cleaned))
    }
}

/// `a | b`, `a / b`, `a or b`: one scalar per alternative.
fn extract_set(rules: &Rules, work: &str) -> Option<FilterValue> {
    let values: Vec<Scalar> = rules
        .alternatives
        .split(work.trim())
        .map(|item| item.trim().trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|item| !item.is_empty())
        .map(|item| match parse_number(item) {
            Some(n) => Scalar::Number(n),
            None => Scalar::Text(item.to_string()),
        })
        .collect();
    (!values.is_empty()).then_some(FilterValue::Set(values))
}

/// Turns free text into filter conditions. Never fails: segments that do not
/// resolve to a field and a value are returned in `unrecognized`.
pub fn parse_natural_language(text: &str) -> NlParse {
    let mut result = NlParse::default();
    let Some(rules) = rules() else {
        let trimmed = text.trim();
        if trimmed.chars().count() > MIN_NOISE_LEN {
            result.unrecognized.push(trimmed.to_string());
        }
        return result;
    };
    for segment in split_segments(rules, text) {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed = parse_segment(rules, trimmed);
        match (parsed.field, parsed.value) {
            (Some(field), Some(value)) => {
                let operator = match (&value, parsed.operator) {
                    (FilterValue::Range(..), _) => FilterOperator::Between,
                    (_, Some(op)) => op,
                    (_, None) => FilterOperator::Contains,
                };
                result.filters.push(
                    FilterCondition::new(field, operator, value).with_unit(parsed.unit),
                );
            }
            _ => {
                if trimmed.chars().count() > MIN_NOISE_LEN {
                    tracing::debug!(segment = trimmed, "unrecognized filter segment");
                    result.unrecognized.push(trimmed.to_string());
                }
            }
        }
    }
    result
}
