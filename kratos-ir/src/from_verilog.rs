//! Lightweight reader for external SystemVerilog module headers.
//!
//! Only the interface is consumed: the module name and its ANSI port
//! declarations. Bodies, parameters, and non-ANSI headers are ignored.
use crate::var::{PortDirection, PortType};
use kratos_utils::{Error, Id, KratosResult};
use linked_hash_map::LinkedHashMap;
use std::path::Path;

/// A port read from an external header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalPort {
    pub direction: PortDirection,
    pub width: u32,
    pub is_signed: bool,
    pub port_type: PortType,
}

/// An external module: its name and its port map, in declaration order.
#[derive(Debug, Clone)]
pub struct ExternalModule {
    pub name: Id,
    pub ports: LinkedHashMap<Id, ExternalPort>,
}

impl ExternalModule {
    /// Load `top`'s header from a SystemVerilog file. `port_types`
    /// overrides the role of named ports; naming a port that does not
    /// exist is an error.
    pub fn from_verilog<P: AsRef<Path>>(
        path: P,
        top: &str,
        port_types: &[(&str, PortType)],
    ) -> KratosResult<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|e| {
            Error::lookup_failure(format!(
                "cannot read `{}': {e}",
                path.display()
            ))
        })?;
        let src = strip_comments(&src);
        let header = find_module_header(&src, top).ok_or_else(|| {
            Error::lookup_failure(format!(
                "module `{top}' not found in `{}'",
                path.display()
            ))
        })?;
        let mut ports = LinkedHashMap::new();
        for (name, port) in parse_port_list(&header)? {
            ports.insert(name, port);
        }
        for &(name, ty) in port_types {
            let id = Id::from(name);
            match ports.get_mut(&id) {
                Some(port) => port.port_type = ty,
                None => {
                    return Err(Error::lookup_failure(format!(
                        "module `{top}' has no port `{name}'"
                    )));
                }
            }
        }
        Ok(Self {
            name: Id::from(top),
            ports,
        })
    }
}

fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Locate `module <top>` and return the text of its parenthesized port
/// list, skipping an optional `#(...)` parameter block.
fn find_module_header(src: &str, top: &str) -> Option<String> {
    let mut search = 0;
    while let Some(offset) = src[search..].find("module") {
        let at = search + offset;
        search = at + "module".len();
        // keyword boundary on both sides
        if at > 0
            && src[..at]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            continue;
        }
        let rest = &src[search..];
        let rest_trim = rest.trim_start();
        let name: String = rest_trim
            .chars()
            .take_while(|&c| c.is_alphanumeric() || c == '_')
            .collect();
        if name != top {
            continue;
        }
        let after_name = &rest_trim[name.len()..];
        let after_name = after_name.trim_start();
        // skip a parameter block
        let after_params = if let Some(stripped) = after_name.strip_prefix('#')
        {
            let stripped = stripped.trim_start();
            skip_balanced(stripped)?
        } else {
            after_name
        };
        let after_params = after_params.trim_start();
        let body = after_params.strip_prefix('(')?;
        let close = matching_paren(body)?;
        return Some(body[..close].to_string());
    }
    None
}

/// Given text starting with `(`, return the text after its matching `)`.
fn skip_balanced(src: &str) -> Option<&str> {
    let body = src.strip_prefix('(')?;
    let close = matching_paren(body)?;
    Some(&body[close + 1..])
}

/// Position of the `)` closing the implicit `(` before `src`.
fn matching_paren(src: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in src.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

fn parse_port_list(
    header: &str,
) -> KratosResult<Vec<(Id, ExternalPort)>> {
    let mut ports = vec![];
    // declarations carry over direction/shape to bare-identifier entries
    let mut current = ExternalPort {
        direction: PortDirection::In,
        width: 1,
        is_signed: false,
        port_type: PortType::Data,
    };
    for decl in header.split(',') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        let mut tokens = decl.split_whitespace();
        let mut name = None;
        while let Some(tok) = tokens.next() {
            match tok {
                "input" => {
                    current.direction = PortDirection::In;
                    current.width = 1;
                    current.is_signed = false;
                }
                "output" => {
                    current.direction = PortDirection::Out;
                    current.width = 1;
                    current.is_signed = false;
                }
                "inout" => {
                    current.direction = PortDirection::InOut;
                    current.width = 1;
                    current.is_signed = false;
                }
                "wire" | "logic" | "reg" | "bit" | "var" => {}
                "signed" => current.is_signed = true,
                _ if tok.starts_with('[') => {
                    current.width = parse_range(tok)?;
                }
                _ => {
                    name = Some(tok.trim_end_matches(';'));
                    break;
                }
            }
        }
        let Some(name) = name else {
            return Err(Error::malformed_structure(format!(
                "port declaration `{decl}' has no name"
            )));
        };
        ports.push((Id::from(name), current));
    }
    Ok(ports)
}

/// Parse `[msb:lsb]` into a width.
fn parse_range(tok: &str) -> KratosResult<u32> {
    let inner = tok
        .trim_start_matches('[')
        .trim_end_matches(']');
    let (msb, lsb) = inner.split_once(':').ok_or_else(|| {
        Error::malformed_structure(format!("cannot parse range `{tok}'"))
    })?;
    let msb: u32 = msb.trim().parse().map_err(|_| {
        Error::malformed_structure(format!("cannot parse range `{tok}'"))
    })?;
    let lsb: u32 = lsb.trim().parse().map_err(|_| {
        Error::malformed_structure(format!("cannot parse range `{tok}'"))
    })?;
    if lsb > msb {
        return Err(Error::malformed_structure(format!(
            "descending range `{tok}' is not supported"
        )));
    }
    Ok(msb - lsb + 1)
}
