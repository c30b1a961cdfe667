//! Parse device configuration source into raw records using PEST.

use crate::ast::*;
use crate::error::ParseError;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct ConfigParser;

/// Parse configuration source into devices and common-packet sections.
pub fn parse(source: &str) -> Result<ConfigFile, ParseError> {
    let pairs = ConfigParser::parse(Rule::file, source).map_err(|e| {
        let (line, column) = match e.line_col {
            LineColLocation::Pos(p) => p,
            LineColLocation::Span(start, _) => start,
        };
        ParseError {
            line,
            column,
            message: e.variant.message().into_owned(),
        }
    })?;
    let pair = pairs.into_iter().next().ok_or_else(|| ParseError::new("empty parse"))?;
    build_file(pair)
}

fn build_file(pair: Pair<Rule>) -> Result<ConfigFile, ParseError> {
    let mut file = ConfigFile::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::device_section => file.devices.push(build_device(inner)?),
            Rule::common_section => file.common.push(build_common(inner)?),
            _ => {}
        }
    }
    Ok(file)
}

fn build_common(pair: Pair<Rule>) -> Result<CommonSection, ParseError> {
    let mut category = String::new();
    let mut packets = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => category = inner.as_str().to_string(),
            Rule::packet => packets.push(build_packet(inner)?),
            _ => {}
        }
    }
    Ok(CommonSection { category, packets })
}

fn build_name_pair(pair: Pair<Rule>) -> Result<(String, String), ParseError> {
    let at = pair.clone();
    let mut it = pair.into_inner();
    let display = it.next().ok_or_else(|| ParseError::at(&at, "name: display name"))?;
    let wire = it.next().ok_or_else(|| ParseError::at(&at, "name: wire name"))?;
    Ok((display.as_str().to_string(), wire.as_str().to_string()))
}

fn build_device(pair: Pair<Rule>) -> Result<DeviceConfig, ParseError> {
    let at = pair.clone();
    let mut name = None;
    let mut human = None;
    let mut category = None;
    let mut device_identifier = None;
    let mut version = None;
    let mut description = None;
    let mut released = false;
    let mut packets = Vec::new();
    let mut constant_groups = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::name_pair => name = Some(build_name_pair(inner)?),
            Rule::string_lit => human = Some(unescape(inner.as_str())),
            Rule::device_property => {
                let prop_at = inner.clone();
                let mut it = inner.into_inner();
                let key = it.next().ok_or_else(|| ParseError::at(&prop_at, "property: key"))?;
                let value = it
                    .next()
                    .and_then(|v| v.into_inner().next())
                    .ok_or_else(|| ParseError::at(&prop_at, "property: value"))?;
                match key.as_str() {
                    "category" => category = Some(expect_ident(&value)?),
                    "identifier" => {
                        let n = expect_literal(&value)?
                            .as_u64()
                            .and_then(|n| u16::try_from(n).ok())
                            .ok_or_else(|| ParseError::at(&value, "identifier: expected integer 0..=65535"))?;
                        device_identifier = Some(n);
                    }
                    "version" => version = Some(parse_version(&value)?),
                    "description" => match expect_literal(&value)? {
                        Literal::String(s) => description = Some(s),
                        _ => return Err(ParseError::at(&value, "description: expected string")),
                    },
                    "released" => {
                        released = expect_literal(&value)?
                            .as_bool()
                            .ok_or_else(|| ParseError::at(&value, "released: expected true or false"))?;
                    }
                    other => {
                        return Err(ParseError::at(&key, format!("unknown device property {:?}", other)))
                    }
                }
            }
            Rule::packet => packets.push(build_packet(inner)?),
            Rule::constants_section => constant_groups.push(build_constants(inner)?),
            _ => {}
        }
    }

    let (display, wire) = name.ok_or_else(|| ParseError::at(&at, "device: missing name"))?;
    Ok(DeviceConfig {
        name: DeviceName {
            display,
            wire,
            human: human.ok_or_else(|| ParseError::at(&at, "device: missing human-readable name"))?,
        },
        category: category.ok_or_else(|| ParseError::at(&at, "device: missing category"))?,
        device_identifier: device_identifier
            .ok_or_else(|| ParseError::at(&at, "device: missing identifier"))?,
        version: version.ok_or_else(|| ParseError::at(&at, "device: missing version"))?,
        description,
        released,
        packets,
        constant_groups,
        common_included: false,
    })
}

fn build_packet(pair: Pair<Rule>) -> Result<PacketConfig, ParseError> {
    let at = pair.clone();
    let mut kind = None;
    let mut names = None;
    let mut function_id = None;
    let mut response_expected = None;
    let mut doc = None;
    let mut elements = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => kind = Some(inner.as_str().to_string()),
            Rule::name_pair => names = Some(build_name_pair(inner)?),
            Rule::packet_attrs => {
                for attr in inner.into_inner() {
                    let attr_at = attr.clone();
                    let mut it = attr.into_inner();
                    let key = it.next().ok_or_else(|| ParseError::at(&attr_at, "attribute: key"))?;
                    let value = it.next().ok_or_else(|| ParseError::at(&attr_at, "attribute: value"))?;
                    let literal = parse_literal(value.as_str());
                    match key.as_str() {
                        "id" => {
                            function_id = Some(
                                literal
                                    .as_u64()
                                    .ok_or_else(|| ParseError::at(&value, "id: expected non-negative integer"))?,
                            )
                        }
                        "response_expected" => {
                            response_expected = Some(
                                literal
                                    .as_bool()
                                    .ok_or_else(|| ParseError::at(&value, "response_expected: expected true or false"))?,
                            )
                        }
                        other => {
                            return Err(ParseError::at(&key, format!("unknown packet attribute {:?}", other)))
                        }
                    }
                }
            }
            Rule::doc_item => {
                let text = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::string_lit)
                    .map(|p| unescape(p.as_str()));
                doc = text;
            }
            Rule::element => elements.push(build_element(inner)?),
            _ => {}
        }
    }

    let (display_name, wire_name) = names.ok_or_else(|| ParseError::at(&at, "packet: missing name"))?;
    Ok(PacketConfig {
        kind: kind.ok_or_else(|| ParseError::at(&at, "packet: missing type"))?,
        display_name,
        wire_name,
        function_id,
        response_expected,
        doc,
        elements,
    })
}

fn build_element(pair: Pair<Rule>) -> Result<ElementConfig, ParseError> {
    let at = pair.clone();
    let mut idents = Vec::new();
    let mut cardinality = 1;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => idents.push(inner.as_str().to_string()),
            Rule::cardinality => {
                let n = inner
                    .clone()
                    .into_inner()
                    .next()
                    .map(|p| parse_literal(p.as_str()))
                    .and_then(|l| match l {
                        // Negative counts are rejected by the schema model as cardinality 0.
                        Literal::Int(i) => Some(u64::try_from(i).unwrap_or(0)),
                        _ => None,
                    })
                    .ok_or_else(|| ParseError::at(&inner, "cardinality: expected integer"))?;
                cardinality = n;
            }
            _ => {}
        }
    }
    let mut it = idents.into_iter();
    match (it.next(), it.next(), it.next()) {
        (Some(name), Some(type_name), Some(direction)) => Ok(ElementConfig {
            name,
            type_name,
            cardinality,
            direction,
        }),
        _ => Err(ParseError::at(&at, "element: expected `name: type direction;`")),
    }
}

fn build_constants(pair: Pair<Rule>) -> Result<ConstantGroupConfig, ParseError> {
    let at = pair.clone();
    let mut idents = Vec::new();
    let mut items = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => idents.push(inner.as_str().to_string()),
            Rule::constant_item => {
                let item_at = inner.clone();
                let mut it = inner.into_inner();
                let name = it.next().ok_or_else(|| ParseError::at(&item_at, "constant: name"))?;
                let value = it.next().ok_or_else(|| ParseError::at(&item_at, "constant: value"))?;
                items.push((name.as_str().to_string(), parse_literal(value.as_str())));
            }
            _ => {}
        }
    }
    let mut it = idents.into_iter();
    match (it.next(), it.next()) {
        (Some(name), Some(type_name)) => Ok(ConstantGroupConfig { name, type_name, items }),
        _ => Err(ParseError::at(&at, "constants: expected `constants Name: type { ... }`")),
    }
}

fn expect_ident(pair: &Pair<Rule>) -> Result<String, ParseError> {
    if pair.as_rule() == Rule::ident {
        Ok(pair.as_str().to_string())
    } else {
        Err(ParseError::at(pair, "expected identifier"))
    }
}

fn expect_literal(pair: &Pair<Rule>) -> Result<Literal, ParseError> {
    if pair.as_rule() == Rule::literal {
        Ok(parse_literal(pair.as_str()))
    } else {
        Err(ParseError::at(pair, "expected literal"))
    }
}

fn parse_version(pair: &Pair<Rule>) -> Result<(u8, u8, u8), ParseError> {
    if pair.as_rule() != Rule::version_lit {
        return Err(ParseError::at(pair, "version: expected major.minor.patch"));
    }
    let parts: Vec<u8> = pair
        .as_str()
        .split('.')
        .map(|p| p.parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| ParseError::at(pair, "version: component out of range 0..=255"))?;
    match parts.as_slice() {
        [major, minor, patch] => Ok((*major, *minor, *patch)),
        _ => Err(ParseError::at(pair, "version: expected major.minor.patch")),
    }
}

fn parse_literal(s: &str) -> Literal {
    let s = s.trim();
    if s == "true" {
        return Literal::Bool(true);
    }
    if s == "false" {
        return Literal::Bool(false);
    }
    if s.starts_with("0x") || s.starts_with("0X") {
        if let Ok(n) = i64::from_str_radix(&s[2..], 16) {
            return Literal::Int(n);
        }
    }
    if let Ok(n) = s.parse::<i64>() {
        return Literal::Int(n);
    }
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        let inner = unescape_body(&s[1..s.len() - 1]);
        if let Some(c) = inner.chars().next() {
            return Literal::Char(c);
        }
    }
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        return Literal::String(unescape(s));
    }
    Literal::String(s.to_string())
}

fn unescape(quoted: &str) -> String {
    let inner = quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(quoted);
    unescape_body(inner)
}

fn unescape_body(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
