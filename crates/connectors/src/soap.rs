//! SOAP envelope construction and parsing for session-oriented banking
//! cores.
//!
//! Envelopes carry a custom header block (`Service`, `Operation`,
//! `BranchCode`, `SourceCode`, `MessageId`, `Timestamp`, optional
//! `SessionToken`) and an operation-specific body element under the
//! configured namespace. A fault in the response body is surfaced as data
//! (`SoapFault`), never as a transport error.

use chrono::{DateTime, Utc};
use gateway_core::config::SoapVersion;
use gateway_core::{GatewayError, GatewayResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::connector::RequestOptions;

const SOAP11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// The custom header block carried on every request.
#[derive(Debug, Clone)]
pub struct SoapHeaderBlock {
    pub service: String,
    pub operation: String,
    pub branch_code: String,
    pub source_code: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_token: Option<String>,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: String,
    pub message: String,
}

/// A parsed response envelope: flattened header fields, the body payload
/// (first non-fault element), and any fault.
#[derive(Debug, Clone)]
pub struct ParsedEnvelope {
    pub header: HashMap<String, String>,
    pub body_element: Option<String>,
    pub body: Value,
    pub fault: Option<SoapFault>,
}

pub fn envelope_namespace(version: SoapVersion) -> &'static str {
    match version {
        SoapVersion::V1_1 => SOAP11_NS,
        SoapVersion::V1_2 => SOAP12_NS,
    }
}

/// Build a request envelope wrapping `data` under `<gw:{body_element}>`.
pub fn build_envelope(
    version: SoapVersion,
    namespace: &str,
    header: &SoapHeaderBlock,
    body_element: &str,
    data: &Value,
) -> GatewayResult<String> {
    let mut writer = Writer::new(Vec::new());
    let protocol = |e: quick_xml::Error| GatewayError::Protocol(format!("envelope build failed: {e}"));

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(protocol)?;

    let mut envelope = BytesStart::new("soapenv:Envelope");
    envelope.push_attribute(("xmlns:soapenv", envelope_namespace(version)));
    envelope.push_attribute(("xmlns:gw", namespace));
    writer.write_event(Event::Start(envelope)).map_err(protocol)?;

    writer
        .write_event(Event::Start(BytesStart::new("soapenv:Header")))
        .map_err(protocol)?;
    writer
        .write_event(Event::Start(BytesStart::new("gw:RequestHeader")))
        .map_err(protocol)?;
    write_simple(&mut writer, "gw:Service", &header.service).map_err(protocol)?;
    write_simple(&mut writer, "gw:Operation", &header.operation).map_err(protocol)?;
    write_simple(&mut writer, "gw:BranchCode", &header.branch_code).map_err(protocol)?;
    write_simple(&mut writer, "gw:SourceCode", &header.source_code).map_err(protocol)?;
    write_simple(&mut writer, "gw:MessageId", &header.message_id).map_err(protocol)?;
    write_simple(
        &mut writer,
        "gw:Timestamp",
        &header.timestamp.to_rfc3339(),
    )
    .map_err(protocol)?;
    if let Some(token) = &header.session_token {
        write_simple(&mut writer, "gw:SessionToken", token).map_err(protocol)?;
    }
    if header.options.async_processing {
        write_simple(&mut writer, "gw:Async", "true").map_err(protocol)?;
    }
    if let Some(priority) = &header.options.priority {
        write_simple(&mut writer, "gw:Priority", priority).map_err(protocol)?;
    }
    if header.options.validate_only {
        write_simple(&mut writer, "gw:ValidateOnly", "true").map_err(protocol)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("gw:RequestHeader")))
        .map_err(protocol)?;
    writer
        .write_event(Event::End(BytesEnd::new("soapenv:Header")))
        .map_err(protocol)?;

    writer
        .write_event(Event::Start(BytesStart::new("soapenv:Body")))
        .map_err(protocol)?;
    let qualified = format!("gw:{body_element}");
    writer
        .write_event(Event::Start(BytesStart::new(qualified.as_str())))
        .map_err(protocol)?;
    write_value(&mut writer, data).map_err(protocol)?;
    writer
        .write_event(Event::End(BytesEnd::new(qualified.as_str())))
        .map_err(protocol)?;
    writer
        .write_event(Event::End(BytesEnd::new("soapenv:Body")))
        .map_err(protocol)?;

    writer
        .write_event(Event::End(BytesEnd::new("soapenv:Envelope")))
        .map_err(protocol)?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| GatewayError::Protocol(format!("envelope is not UTF-8: {e}")))
}

fn write_simple(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Serialize a JSON value as body elements. Objects become nested
/// elements; arrays repeat the enclosing element once per item.
fn write_value(writer: &mut Writer<Vec<u8>>, value: &Value) -> Result<(), quick_xml::Error> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                write_named(writer, key, child)?;
            }
            Ok(())
        }
        other => {
            let text = scalar_text(other);
            writer.write_event(Event::Text(BytesText::new(&text)))
        }
    }
}

fn write_named(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
) -> Result<(), quick_xml::Error> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_named(writer, name, item)?;
            }
            Ok(())
        }
        Value::Object(_) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            write_value(writer, value)?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
            Ok(())
        }
        other => write_simple(writer, name, &scalar_text(other)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Parse a response envelope. Namespace prefixes are stripped; repeated
/// sibling elements fold into arrays.
pub fn parse_envelope(xml: &str) -> GatewayResult<ParsedEnvelope> {
    let (root_name, root) = xml_to_value(xml)?;
    if root_name != "Envelope" {
        return Err(GatewayError::Protocol(format!(
            "expected a SOAP Envelope, got <{root_name}>"
        )));
    }

    let header = root
        .get("Header")
        .and_then(Value::as_object)
        .and_then(|h| h.values().next())
        .and_then(Value::as_object)
        .map(|block| {
            block
                .iter()
                .map(|(k, v)| (k.clone(), scalar_text(v)))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    let body = root
        .get("Body")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| GatewayError::Protocol("envelope has no Body".to_string()))?;

    let fault = body.get("Fault").map(parse_fault);

    let (body_element, payload) = body
        .iter()
        .find(|(name, _)| name.as_str() != "Fault")
        .map(|(name, value)| (Some(name.clone()), value.clone()))
        .unwrap_or((None, Value::Null));

    Ok(ParsedEnvelope {
        header,
        body_element,
        body: payload,
        fault,
    })
}

fn parse_fault(fault: &Value) -> SoapFault {
    // SOAP 1.1 uses faultcode/faultstring; 1.2 nests Code/Value and
    // Reason/Text.
    let code = fault
        .get("faultcode")
        .map(scalar_text)
        .or_else(|| fault.get("Code").and_then(|c| c.get("Value")).map(scalar_text))
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let message = fault
        .get("faultstring")
        .map(scalar_text)
        .or_else(|| fault.get("Reason").and_then(|r| r.get("Text")).map(scalar_text))
        .unwrap_or_else(|| "unspecified fault".to_string());
    SoapFault { code, message }
}

struct PendingElement {
    name: String,
    text: String,
    children: Vec<(String, Value)>,
}

/// Generic XML → JSON: leaf text becomes a string, children become an
/// object, repeated child names fold into an array.
fn xml_to_value(xml: &str) -> GatewayResult<(String, Value)> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<PendingElement> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(PendingElement {
                    name: local_name(start.local_name().as_ref()),
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Ok(Event::Empty(start)) => {
                let name = local_name(start.local_name().as_ref());
                match stack.last_mut() {
                    Some(parent) => parent.children.push((name, Value::Null)),
                    None => return Ok((name, Value::Null)),
                }
            }
            Ok(Event::Text(text)) => {
                let unescaped = text
                    .unescape()
                    .map_err(|e| GatewayError::Protocol(format!("malformed XML text: {e}")))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(unescaped.trim());
                }
            }
            Ok(Event::CData(cdata)) => {
                let raw = String::from_utf8_lossy(&cdata.into_inner()).to_string();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&raw);
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| GatewayError::Protocol("unbalanced XML".to_string()))?;
                let value = element_value(element.text, element.children);
                match stack.last_mut() {
                    Some(parent) => parent.children.push((element.name, value)),
                    None => return Ok((element.name, value)),
                }
            }
            Ok(Event::Eof) => {
                return Err(GatewayError::Protocol(
                    "unexpected end of XML document".to_string(),
                ))
            }
            Ok(_) => {}
            Err(e) => return Err(GatewayError::Protocol(format!("malformed XML: {e}"))),
        }
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_string()
}

fn element_value(text: String, children: Vec<(String, Value)>) -> Value {
    if children.is_empty() {
        return if text.is_empty() {
            Value::Null
        } else {
            Value::String(text)
        };
    }
    let mut map = Map::new();
    for (name, value) in children {
        match map.get_mut(&name) {
            None => {
                map.insert(name, value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Value::Object(map)
}
