use crate::error::{GatewayError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub const SOAP11_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_ENVELOPE_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

const BODY: &str = "Body";

/// Portion of a qualified name after the last `:`.
pub fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: String,
    pub value: String,
}

/// A namespace declaration captured from the envelope root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// `xmlns:soapenv` or `xmlns`
    pub name: String,
    pub uri: String,
}

impl Namespace {
    /// Declared prefix; the default namespace has the empty prefix.
    pub fn prefix(&self) -> &str {
        self.name.strip_prefix("xmlns:").unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRef {
    pub qualified_name: String,
    pub attributes: Vec<XmlAttribute>,
}

impl OperationRef {
    pub fn local_name(&self) -> &str {
        local_name(&self.qualified_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub qualified_name: String,
    pub value: String,
    pub attributes: Vec<XmlAttribute>,
}

impl Argument {
    pub fn local_name(&self) -> &str {
        local_name(&self.qualified_name)
    }
}

/// One decoded operation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub namespaces: Vec<Namespace>,
    pub operation: OperationRef,
    /// Source order is preserved.
    pub arguments: Vec<Argument>,
}

impl Envelope {
    /// First argument whose local name equals `name`.
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.local_name() == name)
    }

    /// Prefix bound to a known SOAP envelope namespace, SOAP 1.1 first.
    pub fn envelope_prefix(&self) -> Option<&str> {
        [SOAP11_ENVELOPE_NS, SOAP12_ENVELOPE_NS].iter().find_map(|uri| {
            self.namespaces
                .iter()
                .find(|ns| ns.uri == *uri)
                .map(|ns| ns.prefix())
        })
    }

    /// Namespace URI bound to `prefix`.
    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|ns| ns.prefix() == prefix)
            .map(|ns| ns.uri.as_str())
    }
}

fn parse_err(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Parse(e.to_string())
}

fn qualified_name(start: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(parse_err)
}

fn attributes(start: &BytesStart<'_>) -> Result<Vec<XmlAttribute>> {
    start
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(parse_err)?;
            let name = std::str::from_utf8(attr.key.as_ref()).map_err(parse_err)?;
            let value = attr.unescape_value().map_err(parse_err)?;
            Ok(XmlAttribute {
                name: name.to_string(),
                value: value.into_owned(),
            })
        })
        .collect()
}

#[derive(Debug, Default)]
struct Decoder {
    depth: usize,
    namespaces: Option<Vec<Namespace>>,
    /// Inside the first `Body` child of the root.
    in_body: bool,
    body_seen: bool,
    operation: Option<OperationRef>,
    operation_closed: bool,
    arguments: Vec<Argument>,
    /// Argument being collected (depth 3).
    current: Option<Argument>,
}

impl Decoder {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<()> {
        let name = qualified_name(start)?;
        match self.depth {
            0 => {
                if self.namespaces.is_some() {
                    return Err(GatewayError::Parse("multiple root elements".to_string()));
                }
                let namespaces = attributes(start)?
                    .into_iter()
                    .filter(|a| a.name == "xmlns" || a.name.starts_with("xmlns:"))
                    .map(|a| Namespace { name: a.name, uri: a.value })
                    .collect();
                self.namespaces = Some(namespaces);
            }
            1 if !self.body_seen && local_name(&name) == BODY => {
                self.in_body = true;
                self.body_seen = true;
            }
            2 if self.in_body && self.operation.is_none() => {
                self.operation = Some(OperationRef {
                    qualified_name: name,
                    attributes: attributes(start)?,
                });
            }
            3 if self.in_body && !self.operation_closed && self.operation.is_some() => {
                self.current = Some(Argument {
                    qualified_name: name,
                    value: String::new(),
                    attributes: attributes(start)?,
                });
            }
            _ => {}
        }
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.depth -= 1;
        match self.depth {
            1 if self.in_body => self.in_body = false,
            2 if self.in_body && self.operation.is_some() => self.operation_closed = true,
            3 => {
                if let Some(argument) = self.current.take() {
                    self.arguments.push(argument);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(argument) = self.current.as_mut() {
            argument.value.push_str(text);
        }
    }

    fn finish(self) -> Result<Envelope> {
        let namespaces = self
            .namespaces
            .ok_or_else(|| GatewayError::Parse("document has no root element".to_string()))?;
        if !self.body_seen {
            return Err(GatewayError::Parse("envelope has no Body element".to_string()));
        }
        let operation = self
            .operation
            .ok_or_else(|| GatewayError::Parse("Body has no operation element".to_string()))?;
        Ok(Envelope {
            namespaces,
            operation,
            arguments: self.arguments,
        })
    }
}

/// Parses an inbound envelope. The operation is the first element inside
/// `Body`; each of its child elements is an argument whose value is the
/// concatenated text and CDATA beneath it.
pub fn decode(xml: &str) -> Result<Envelope> {
    if xml.trim().is_empty() {
        return Err(GatewayError::Parse("empty envelope".to_string()));
    }

    let mut reader = Reader::from_str(xml);
    let mut decoder = Decoder::default();

    loop {
        match reader.read_event().map_err(parse_err)? {
            Event::Start(start) => decoder.open(&start)?,
            Event::Empty(start) => {
                decoder.open(&start)?;
                decoder.close();
            }
            Event::End(_) => {
                if decoder.depth == 0 {
                    return Err(GatewayError::Parse("unexpected closing tag".to_string()));
                }
                decoder.close();
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(parse_err)?;
                if decoder.depth == 0 && !text.trim().is_empty() {
                    return Err(GatewayError::Parse("text outside the root element".to_string()));
                }
                decoder.text(&text);
            }
            Event::CData(cdata) => {
                let text = String::from_utf8(cdata.into_inner().into_owned()).map_err(parse_err)?;
                decoder.text(&text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if decoder.depth != 0 {
        return Err(GatewayError::Parse("unexpected end of document".to_string()));
    }
    decoder.finish()
}
