use crate::error::{GatewayError, Result};
use crate::soap::envelope::{Envelope, Namespace, SOAP11_ENVELOPE_NS};
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use regex::{Captures, Regex};
use serde::Serialize;

/// Root element of the serialized result document.
pub const RESPONSE_ROOT: &str = "response";
pub const DATA_TYPE_NONE: &str = "none";

/// Outcome of one operation as seen by the caller. Always produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    /// 0 on success, anything else on failure.
    pub result_code: i32,
    pub result_message: String,
    pub data_type: String,
    pub payload: Option<String>,
}

impl ResponseEnvelope {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            result_code: 0,
            result_message: message.into(),
            data_type: DATA_TYPE_NONE.to_string(),
            payload: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            result_code: 1,
            result_message: message.into(),
            data_type: DATA_TYPE_NONE.to_string(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, data_type: impl Into<String>, payload: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self.payload = Some(payload.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    fn document(&self) -> ResponseDocument<'_> {
        ResponseDocument {
            head: ResponseHead {
                result: self.result_code,
                result_info: &self.result_message,
                data_type: &self.data_type,
            },
            data: self.payload.as_deref().unwrap_or_default(),
        }
    }
}

impl From<&GatewayError> for ResponseEnvelope {
    fn from(err: &GatewayError) -> Self {
        ResponseEnvelope::failure(err.to_string())
    }
}

#[derive(Serialize)]
struct ResponseDocument<'a> {
    head: ResponseHead<'a>,
    data: &'a str,
}

#[derive(Serialize)]
struct ResponseHead<'a> {
    #[serde(rename = "Result")]
    result: i32,
    #[serde(rename = "ResultInfo")]
    result_info: &'a str,
    #[serde(rename = "DataType")]
    data_type: &'a str,
}

static START_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z_][^<>]*>").expect("start tag pattern"));
static PREFIXED_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s+(\w+):(\w+)="[^"]*""#).expect("attribute pattern"));

/// Removes `prefix:name="value"` attributes from start tags unless listed in
/// `keep`. Serializers inject such declarations on nested elements and the
/// downstream bus rejects them, so every payload passes through here.
pub fn strip_injected_namespaces(xml: &str, keep: &[&str]) -> String {
    START_TAG
        .replace_all(xml, |tag: &Captures| {
            PREFIXED_ATTRIBUTE
                .replace_all(&tag[0], |attr: &Captures| {
                    let name = format!("{}:{}", &attr[1], &attr[2]);
                    if keep.contains(&name.as_str()) {
                        attr[0].to_string()
                    } else {
                        String::new()
                    }
                })
                .into_owned()
        })
        .into_owned()
}

fn encoding_err(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Encoding(e.to_string())
}

fn qualify(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

/// Keeps operation names usable as element names.
fn element_safe(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    match cleaned.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => cleaned,
        _ => "Unknown".to_string(),
    }
}

/// Serializes results into `{operation}Response` envelopes.
#[derive(Debug, Clone)]
pub struct EnvelopeEncoder {
    service_namespace: String,
    result_element: Option<String>,
}

impl EnvelopeEncoder {
    /// `result_element` of `None` (or empty) names the result `{operation}Result`.
    pub fn new(service_namespace: impl Into<String>, result_element: Option<String>) -> Self {
        Self {
            service_namespace: service_namespace.into(),
            result_element: result_element.filter(|r| !r.trim().is_empty()),
        }
    }

    pub fn result_name(&self, operation: &str) -> String {
        self.result_element
            .clone()
            .unwrap_or_else(|| format!("{}Result", operation))
    }

    pub fn encode_response(&self, request: &Envelope, response: &ResponseEnvelope) -> Result<String> {
        self.encode(request, RESPONSE_ROOT, &response.document())
    }

    /// Serializes `payload` under `payload_root` and wraps it in an envelope
    /// whose prefix is the one the request bound to the SOAP envelope URI.
    pub fn encode<T: Serialize>(&self, request: &Envelope, payload_root: &str, payload: &T) -> Result<String> {
        let prefix = request.envelope_prefix().ok_or_else(|| {
            GatewayError::Encoding("request declares no SOAP envelope namespace".to_string())
        })?;

        let payload_xml =
            quick_xml::se::to_string_with_root(payload_root, payload).map_err(encoding_err)?;
        let payload_xml = strip_injected_namespaces(&payload_xml, &[]);

        self.write_envelope(
            prefix,
            &request.namespaces,
            &element_safe(request.operation.local_name()),
            &payload_xml,
        )
    }

    fn write_envelope(
        &self,
        prefix: &str,
        namespaces: &[Namespace],
        operation: &str,
        payload_xml: &str,
    ) -> Result<String> {
        let envelope = qualify(prefix, "Envelope");
        let body = qualify(prefix, "Body");
        let wrapper = format!("{}Response", operation);
        let result = element_safe(&self.result_name(operation));

        let mut root = BytesStart::new(envelope.as_str());
        for ns in namespaces {
            root.push_attribute((ns.name.as_str(), ns.uri.as_str()));
        }

        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(encoding_err)?;
        writer.write_event(Event::Start(root)).map_err(encoding_err)?;
        writer
            .write_event(Event::Start(BytesStart::new(body.as_str())))
            .map_err(encoding_err)?;
        writer
            .write_event(Event::Start(
                BytesStart::new(wrapper.as_str())
                    .with_attributes([("xmlns", self.service_namespace.as_str())]),
            ))
            .map_err(encoding_err)?;
        writer
            .write_event(Event::Start(BytesStart::new(result.as_str())))
            .map_err(encoding_err)?;
        writer
            .write_event(Event::Text(BytesText::from_escaped(payload_xml)))
            .map_err(encoding_err)?;
        for name in [&result, &wrapper, &body, &envelope] {
            writer
                .write_event(Event::End(BytesEnd::new(name.as_str())))
                .map_err(encoding_err)?;
        }

        String::from_utf8(writer.into_inner()).map_err(encoding_err)
    }

    /// Fixed-shape SOAP 1.1 envelope used when the regular encoding fails or
    /// no request envelope could be decoded.
    pub fn fallback(&self, operation: &str, response: &ResponseEnvelope) -> String {
        let operation = element_safe(operation);
        let result = element_safe(&self.result_name(&operation));
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<s:Envelope xmlns:s="{envelope_ns}"><s:Body>"#,
                r#"<{operation}Response xmlns="{service_ns}"><{result}>"#,
                r#"<response><head><Result>{code}</Result><ResultInfo>{message}</ResultInfo>"#,
                r#"<DataType>{data_type}</DataType></head><data>{data}</data></response>"#,
                r#"</{result}></{operation}Response></s:Body></s:Envelope>"#
            ),
            envelope_ns = SOAP11_ENVELOPE_NS,
            operation = operation,
            service_ns = escape(self.service_namespace.as_str()),
            result = result,
            code = response.result_code,
            message = escape(response.result_message.as_str()),
            data_type = escape(response.data_type.as_str()),
            data = escape(response.payload.as_deref().unwrap_or_default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::envelope::decode;
    use serde::Deserialize;

    const REQUEST: &str = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:tem="http://tempuri.org/"><soapenv:Body><tem:ROSASTrade><tem:serviceParas>x</tem:serviceParas></tem:ROSASTrade></soapenv:Body></soapenv:Envelope>"#;

    #[derive(Debug, Deserialize)]
    struct Head {
        #[serde(rename = "Result")]
        result: i32,
        #[serde(rename = "ResultInfo")]
        result_info: String,
        #[serde(rename = "DataType")]
        data_type: String,
    }

    #[derive(Debug, Deserialize)]
    struct Document {
        head: Head,
    }

    fn encoder() -> EnvelopeEncoder {
        EnvelopeEncoder::new("http://tempuri.org/", Some("Response".to_string()))
    }

    fn payload_between<'a>(xml: &'a str, element: &str) -> &'a str {
        let open = format!("<{}>", element);
        let close = format!("</{}>", element);
        let start = xml.find(&open).unwrap() + open.len();
        let end = xml.rfind(&close).unwrap();
        &xml[start..end]
    }

    #[test]
    fn test_encode_wraps_result_in_operation_response() {
        let request = decode(REQUEST).unwrap();
        let xml = encoder()
            .encode_response(&request, &ResponseEnvelope::success("download success: ftp://u:p@h/a.txt"))
            .unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<soapenv:Envelope"));
        assert!(!xml.contains("Header"));
        assert!(xml.contains(r#"<ROSASTradeResponse xmlns="http://tempuri.org/">"#));

        let parsed = decode(&xml).unwrap();
        assert_eq!(parsed.operation.local_name(), "ROSASTradeResponse");
        assert_eq!(parsed.arguments.len(), 1);
        assert_eq!(parsed.arguments[0].local_name(), "Response");

        let document: Document = quick_xml::de::from_str(payload_between(&xml, "Response")).unwrap();
        assert_eq!(document.head.result, 0);
        assert_eq!(document.head.result_info, "download success: ftp://u:p@h/a.txt");
        assert_eq!(document.head.data_type, "none");
    }

    #[test]
    fn test_default_result_name() {
        let request = decode(REQUEST).unwrap();
        let xml = EnvelopeEncoder::new("http://tempuri.org/", None)
            .encode_response(&request, &ResponseEnvelope::failure("boom"))
            .unwrap();
        assert!(xml.contains("<ROSASTradeResult>"));
        let document: Document =
            quick_xml::de::from_str(payload_between(&xml, "ROSASTradeResult")).unwrap();
        assert_eq!(document.head.result, 1);
    }

    #[test]
    fn test_encode_requires_envelope_namespace() {
        let mut request = decode(REQUEST).unwrap();
        request.namespaces.retain(|ns| ns.prefix() != "soapenv");
        let err = encoder()
            .encode_response(&request, &ResponseEnvelope::success("ok"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Encoding(_)));
    }

    #[test]
    fn test_encode_escapes_message() {
        let request = decode(REQUEST).unwrap();
        let xml = encoder()
            .encode_response(&request, &ResponseEnvelope::failure("a < b & c"))
            .unwrap();
        let document: Document = quick_xml::de::from_str(payload_between(&xml, "Response")).unwrap();
        assert_eq!(document.head.result_info, "a < b & c");
    }

    #[test]
    fn test_strip_injected_namespaces() {
        let xml = r#"<response xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema"><head d2p1:type="x" id="1"><ResultInfo>key a:b="c"</ResultInfo></head></response>"#;
        let cleaned = strip_injected_namespaces(xml, &[]);
        assert_eq!(
            cleaned,
            r#"<response><head id="1"><ResultInfo>key a:b="c"</ResultInfo></head></response>"#
        );

        let kept = strip_injected_namespaces(r#"<a xmlns:s="u" x:y="z"/>"#, &["xmlns:s"]);
        assert_eq!(kept, r#"<a xmlns:s="u"/>"#);
    }

    #[test]
    fn test_fallback_is_well_formed() {
        let xml = encoder().fallback("bad name!", &ResponseEnvelope::failure("parse <error>"));
        let parsed = decode(&xml).unwrap();
        assert_eq!(parsed.operation.local_name(), "badnameResponse");
        let document: Document = quick_xml::de::from_str(payload_between(&xml, "Response")).unwrap();
        assert_eq!(document.head.result, 1);
        assert_eq!(document.head.result_info, "parse <error>");
    }

    #[test]
    fn test_element_safe() {
        assert_eq!(element_safe("ROSASTrade"), "ROSASTrade");
        assert_eq!(element_safe("\"http://x/Op\""), "httpxOp");
        assert_eq!(element_safe("9lives"), "Unknown");
        assert_eq!(element_safe(""), "Unknown");
        assert_eq!(element_safe("数据同步"), "数据同步");
        assert_eq!(element_safe("Übertragung"), "Übertragung");
    }

    #[test]
    fn test_fallback_keeps_unicode_operation_name() {
        let xml = encoder().fallback("数据同步", &ResponseEnvelope::failure("x"));
        assert!(xml.contains("<数据同步Response"), "{}", xml);
        assert_eq!(decode(&xml).unwrap().operation.local_name(), "数据同步Response");
    }
}
