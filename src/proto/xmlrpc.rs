//! The XML-RPC protocol processor.
//!
//! Parses a `methodCall`, dispatches against the server's rpc map plus the
//! optional `system.*` handlers, and serializes a `methodResponse` or a
//! fault. A fault is always a `value/struct` with exactly two members,
//! `faultCode` and `faultString`; an application error's `data` payload has
//! no representation in this format and is dropped.

use chrono::NaiveDateTime;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::errors::RpcError;
use crate::operation::Arguments;
use crate::server::{CallContext, Server};

pub const CONTENT_TYPE: &str = "application/xml; charset=UTF-8";

/// Fault code for unexpected runtime failures during dispatch.
const FAULT_INTERNAL: i32 = -32500;

const FAULTS_INTEROP_SPEC_URL: &str =
    "http://xmlrpc-epi.sourceforge.net/specs/rfc.fault_codes.php";
const FAULTS_INTEROP_SPEC_VERSION: i64 = 20010516;

/// Toggles for the standard `system.*` handlers.
#[derive(Debug, Clone)]
pub struct XmlRpcOptions {
    pub multicall: bool,
    pub introspection: bool,
    pub capabilities: bool,
}

impl Default for XmlRpcOptions {
    fn default() -> Self {
        Self {
            multicall: true,
            introspection: true,
            capabilities: true,
        }
    }
}

/// Processes a raw XML-RPC body into a serialized response body. Every
/// failure becomes a fault response; nothing propagates to the transport.
pub fn process(server: &Server, body: &[u8], ctx: &CallContext, options: &XmlRpcOptions) -> String {
    let outcome = std::str::from_utf8(body)
        .map_err(|_| RpcError::parse("request body is not valid UTF-8"))
        .and_then(parse_method_call)
        .and_then(|(method, params)| {
            let result = call(server, &method, params, ctx, options);
            info!(
                method = %method,
                protocol = "xmlrpc",
                outcome = if result.is_ok() { "success" } else { "failure" },
                "rpc call dispatched"
            );
            result
        });

    match outcome {
        Ok(value) => format_response(&value),
        Err(err) => format_fault(fault_code(&err), &err.to_string()),
    }
}

fn call(
    server: &Server,
    method: &str,
    params: Vec<Value>,
    ctx: &CallContext,
    options: &XmlRpcOptions,
) -> Result<Value, RpcError> {
    match method {
        "system.multicall" if options.multicall => multicall(server, params, ctx, options),
        "system.listMethods" if options.introspection => Ok(list_methods(server, options)),
        "system.getCapabilities" if options.capabilities => Ok(capabilities()),
        _ => server.invoke(method, Arguments::Positional(params), ctx),
    }
}

/// Application errors keep their own code; internal failures collapse to the
/// generic dispatch fault code.
fn fault_code(err: &RpcError) -> i32 {
    match err {
        RpcError::Internal(_) => FAULT_INTERNAL,
        other => other.code(),
    }
}

/// Boxcarred sub-calls: each entry answers with a one-element array on
/// success or a fault struct on failure. Recursion is refused.
fn multicall(
    server: &Server,
    params: Vec<Value>,
    ctx: &CallContext,
    options: &XmlRpcOptions,
) -> Result<Value, RpcError> {
    let calls = match params.as_slice() {
        [Value::Array(calls)] => calls,
        _ => {
            return Err(RpcError::invalid_params(
                "system.multicall expects a single array of call structs",
            ))
        }
    };

    let results = calls
        .iter()
        .map(|entry| match multicall_entry(server, entry, ctx, options) {
            Ok(value) => json!([value]),
            Err(err) => json!({
                "faultCode": fault_code(&err),
                "faultString": err.to_string(),
            }),
        })
        .collect();
    Ok(Value::Array(results))
}

fn multicall_entry(
    server: &Server,
    entry: &Value,
    ctx: &CallContext,
    options: &XmlRpcOptions,
) -> Result<Value, RpcError> {
    let call_struct = entry
        .as_object()
        .ok_or_else(|| RpcError::invalid_params("multicall entries must be structs"))?;
    let method = call_struct
        .get("methodName")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("multicall entry is missing methodName"))?;
    if method == "system.multicall" {
        return Err(RpcError::invalid_params("recursive system.multicall is refused"));
    }
    let params = match call_struct.get("params") {
        None => Vec::new(),
        Some(Value::Array(values)) => values.clone(),
        Some(_) => {
            return Err(RpcError::invalid_params("multicall entry params must be an array"))
        }
    };
    call(server, method, params, ctx, options)
}

fn list_methods(server: &Server, options: &XmlRpcOptions) -> Value {
    let mut names: Vec<String> = server
        .rpc_names()
        .into_iter()
        .map(String::from)
        .collect();
    names.push("system.listMethods".to_string());
    if options.multicall {
        names.push("system.multicall".to_string());
    }
    if options.capabilities {
        names.push("system.getCapabilities".to_string());
    }
    names.sort_unstable();
    Value::Array(names.into_iter().map(Value::String).collect())
}

/// Advertises fault-code interoperability per the XMLRPC-EPI specification.
fn capabilities() -> Value {
    json!({
        "faults_interop": {
            "specUrl": FAULTS_INTEROP_SPEC_URL,
            "specVersion": FAULTS_INTEROP_SPEC_VERSION,
        }
    })
}

// ---------------------------------------------------------------------------
// Envelope formatting

fn format_response(value: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodResponse><params><param>");
    write_value(&mut out, value);
    out.push_str("</param></params></methodResponse>");
    out
}

fn format_fault(code: i32, message: &str) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodResponse><fault><value><struct>");
    out.push_str("<member><name>faultCode</name><value><i4>");
    out.push_str(&code.to_string());
    out.push_str("</i4></value></member>");
    out.push_str("<member><name>faultString</name><value><string>");
    out.push_str(&escape(message));
    out.push_str("</string></value></member>");
    out.push_str("</struct></value></fault></methodResponse>");
    out
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(flag) => {
            out.push_str(if *flag { "<boolean>1</boolean>" } else { "<boolean>0</boolean>" });
        }
        Value::Number(number) => match number.as_i64() {
            Some(int) if i32::try_from(int).is_ok() => {
                out.push_str("<i4>");
                out.push_str(&int.to_string());
                out.push_str("</i4>");
            }
            _ => {
                out.push_str("<double>");
                out.push_str(&number.to_string());
                out.push_str("</double>");
            }
        },
        Value::String(text) => {
            out.push_str("<string>");
            out.push_str(&escape(text));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Object(map) => {
            out.push_str("<struct>");
            for (name, item) in map {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                write_value(out, item);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

// ---------------------------------------------------------------------------
// Envelope parsing

fn xml_err(err: quick_xml::Error) -> RpcError {
    RpcError::parse(err.to_string())
}

fn parse_method_call(body: &str) -> Result<(String, Vec<Value>), RpcError> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut saw_call = false;
    let mut in_param = false;
    let mut method_name: Option<String> = None;
    let mut params = Vec::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(element) => match element.name().as_ref() {
                b"methodCall" => saw_call = true,
                b"methodName" => method_name = Some(read_text(&mut reader, b"methodName")?),
                b"param" => in_param = true,
                b"value" if in_param => params.push(read_value(&mut reader)?),
                b"params" => {}
                other => {
                    return Err(RpcError::parse(format!(
                        "unexpected element `{}'",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::End(element) if element.name().as_ref() == b"param" => in_param = false,
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_call {
        return Err(RpcError::invalid_request("missing methodCall element"));
    }
    let method = method_name.ok_or_else(|| RpcError::invalid_request("missing methodName"))?;
    Ok((method, params))
}

/// Reads one `<value>` body; the reader is positioned just past the opening
/// tag. Untyped text is a string, an empty value is the empty string.
fn read_value(reader: &mut Reader<&[u8]>) -> Result<Value, RpcError> {
    let mut typed: Option<Value> = None;
    let mut text: Option<String> = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Text(content) => {
                text = Some(content.unescape().map_err(xml_err)?.into_owned());
            }
            Event::Start(element) => {
                let tag = element.name().as_ref().to_vec();
                typed = Some(read_typed(reader, &tag)?);
            }
            Event::Empty(element) => {
                typed = Some(match element.name().as_ref() {
                    b"nil" => Value::Null,
                    b"string" => Value::String(String::new()),
                    other => {
                        return Err(RpcError::parse(format!(
                            "unexpected empty element `{}'",
                            String::from_utf8_lossy(other)
                        )))
                    }
                });
            }
            Event::End(element) if element.name().as_ref() == b"value" => break,
            Event::Eof => return Err(RpcError::parse("unexpected end of document")),
            _ => {}
        }
    }
    Ok(typed
        .or(text.map(Value::String))
        .unwrap_or_else(|| Value::String(String::new())))
}

fn read_typed(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<Value, RpcError> {
    match tag {
        b"int" | b"i4" | b"i8" => {
            let text = read_text(reader, tag)?;
            text.trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| RpcError::parse(format!("invalid integer value `{}'", text.trim())))
        }
        b"boolean" => {
            let text = read_text(reader, tag)?;
            match text.trim() {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" => Ok(Value::Bool(false)),
                other => Err(RpcError::parse(format!("invalid boolean value `{other}'"))),
            }
        }
        b"double" => {
            let text = read_text(reader, tag)?;
            text.trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| RpcError::parse(format!("invalid double value `{}'", text.trim())))
        }
        b"string" => Ok(Value::String(read_text(reader, tag)?)),
        b"base64" => Ok(Value::String(read_text(reader, tag)?.trim().to_string())),
        b"dateTime.iso8601" => parse_datetime(&read_text(reader, tag)?),
        b"array" => read_array(reader),
        b"struct" => read_struct(reader),
        other => Err(RpcError::parse(format!(
            "unknown value type `{}'",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Both the compact XML-RPC form (19980717T14:08:55) and the dashed ISO form
/// are accepted; the value surfaces as a normalized ISO 8601 string.
fn parse_datetime(text: &str) -> Result<Value, RpcError> {
    let trimmed = text.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .map(|parsed| Value::String(parsed.format("%Y-%m-%dT%H:%M:%S").to_string()))
        .map_err(|_| RpcError::parse(format!("invalid dateTime.iso8601 value `{trimmed}'")))
}

fn read_array(reader: &mut Reader<&[u8]>) -> Result<Value, RpcError> {
    let mut items = Vec::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(element) => match element.name().as_ref() {
                b"data" => {}
                b"value" => items.push(read_value(reader)?),
                other => {
                    return Err(RpcError::parse(format!(
                        "unexpected element `{}' in array",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::End(element) if element.name().as_ref() == b"array" => break,
            Event::End(_) => {}
            Event::Eof => return Err(RpcError::parse("unexpected end of document")),
            _ => {}
        }
    }
    Ok(Value::Array(items))
}

fn read_struct(reader: &mut Reader<&[u8]>) -> Result<Value, RpcError> {
    let mut map = Map::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(element) if element.name().as_ref() == b"member" => {
                let (name, value) = read_member(reader)?;
                map.insert(name, value);
            }
            Event::End(element) if element.name().as_ref() == b"struct" => break,
            Event::Eof => return Err(RpcError::parse("unexpected end of document")),
            _ => {}
        }
    }
    Ok(Value::Object(map))
}

fn read_member(reader: &mut Reader<&[u8]>) -> Result<(String, Value), RpcError> {
    let mut name: Option<String> = None;
    let mut value: Option<Value> = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(element) => match element.name().as_ref() {
                b"name" => name = Some(read_text(reader, b"name")?),
                b"value" => value = Some(read_value(reader)?),
                other => {
                    return Err(RpcError::parse(format!(
                        "unexpected element `{}' in member",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::End(element) if element.name().as_ref() == b"member" => break,
            Event::Eof => return Err(RpcError::parse("unexpected end of document")),
            _ => {}
        }
    }
    let name = name.ok_or_else(|| RpcError::parse("struct member is missing a name"))?;
    let value = value.ok_or_else(|| RpcError::parse("struct member is missing a value"))?;
    Ok((name, value))
}

/// Accumulates the text content up to the matching close tag.
fn read_text(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<String, RpcError> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Text(content) => text.push_str(&content.unescape().map_err(xml_err)?),
            Event::End(element) if element.name().as_ref() == tag => break,
            Event::Eof => return Err(RpcError::parse("unexpected end of document")),
            Event::Start(element) => {
                return Err(RpcError::parse(format!(
                    "unexpected element `{}'",
                    String::from_utf8_lossy(element.name().as_ref())
                )))
            }
            _ => {}
        }
    }
    Ok(text)
}
