//! `methodCall` and `methodResponse` envelopes.

use crate::codec::{child_element, escape_into, ValueCodec};
use crate::error::ProtocolError;
use crate::flags::Capabilities;
use crate::value::Value;
use roxmltree::Node;
use std::fmt;

/// Media type for XML-RPC bodies.
pub const TYPE_XML: &str = "text/xml";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// A method call: name plus ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    method_name: String,
    params: Vec<Value>,
}

impl MethodCall {
    pub fn new(method_name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method_name: method_name.into(),
            params,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Checks a method name against the strict character set
    /// `[A-Za-z0-9._:/]`.
    pub fn validate_method_name(name: &str) -> Result<(), ProtocolError> {
        let valid = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '/'));
        if valid {
            Ok(())
        } else {
            Err(ProtocolError::InvalidMethodName(name.to_string()))
        }
    }

    /// Renders the complete request document.
    pub fn to_xml(&self, caps: Capabilities) -> Result<String, ProtocolError> {
        if caps.is_strict() {
            Self::validate_method_name(&self.method_name)?;
        }

        let codec = ValueCodec::new(caps);
        let mut out = String::with_capacity(128);
        out.push_str(XML_DECLARATION);
        out.push_str("<methodCall><methodName>");
        escape_into(&self.method_name, &mut out)?;
        out.push_str("</methodName>");
        if !self.params.is_empty() {
            out.push_str("<params>");
            for param in &self.params {
                out.push_str("<param>");
                codec.encode_into(param, &mut out)?;
                out.push_str("</param>");
            }
            out.push_str("</params>");
        }
        out.push_str("</methodCall>");
        Ok(out)
    }
}

/// A failure reported by the remote method itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Extracts a fault from the decoded `<fault>` payload.
    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let members = match value {
            Value::Struct(members) => members,
            other => {
                return Err(ProtocolError::invalid_response(format!(
                    "fault payload must be a struct, got {}",
                    other.type_name()
                )))
            }
        };

        let code = members
            .get("faultCode")
            .ok_or_else(|| ProtocolError::invalid_response("fault struct is missing faultCode"))?
            .as_i32()
            .ok_or_else(|| {
                ProtocolError::invalid_response("faultCode must be a 4-byte integer")
            })?;
        let message = members
            .get("faultString")
            .ok_or_else(|| {
                ProtocolError::invalid_response("fault struct is missing faultString")
            })?
            .as_str()
            .ok_or_else(|| ProtocolError::invalid_response("faultString must be a string"))?
            .to_string();

        Ok(Self { code, message })
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Fault {}

/// Outcome carried by a `methodResponse` document.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault(Fault),
}

impl MethodResponse {
    /// Parses a response body.
    pub fn parse(body: &[u8], caps: Capabilities) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(body).map_err(|_| ProtocolError::InvalidUtf8)?;
        Self::parse_str(text, caps)
    }

    /// Parses a response document that is already text.
    pub fn parse_str(text: &str, caps: Capabilities) -> Result<Self, ProtocolError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let doc = roxmltree::Document::parse(text)?;
        let root = doc.root_element();
        if root.tag_name().name() != "methodResponse" {
            return Err(ProtocolError::invalid_response("not a method response"));
        }

        let codec = ValueCodec::new(caps);
        let body = only_element(root)?;
        match body.tag_name().name() {
            "fault" => {
                let value = only_element(body)?;
                expect_tag(value, "value")?;
                let fault = Fault::from_value(codec.decode(value)?)?;
                Ok(MethodResponse::Fault(fault))
            }
            "params" => {
                let params: Vec<Node<'_, '_>> =
                    body.children().filter(|n| n.is_element()).collect();
                if params.len() != 1 {
                    return Err(ProtocolError::invalid_response(format!(
                        "expected exactly one <param>, found {}",
                        params.len()
                    )));
                }
                let param = params[0];
                expect_tag(param, "param")?;
                let value = child_element(param, "value")
                    .ok_or_else(|| ProtocolError::invalid_response("<param> without <value>"))?;
                Ok(MethodResponse::Success(codec.decode(value)?))
            }
            other => Err(ProtocolError::invalid_response(format!(
                "unexpected <{}> in methodResponse",
                other
            ))),
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, MethodResponse::Fault(_))
    }

    pub fn into_result(self) -> Result<Value, Fault> {
        match self {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault(fault) => Err(fault),
        }
    }
}

/// Returns the single element child of `node`.
fn only_element<'a, 'input>(node: Node<'a, 'input>) -> Result<Node<'a, 'input>, ProtocolError> {
    let mut elements = node.children().filter(|n| n.is_element());
    match (elements.next(), elements.next()) {
        (Some(child), None) => Ok(child),
        (None, _) => Err(ProtocolError::invalid_response(format!(
            "<{}> is empty",
            node.tag_name().name()
        ))),
        (Some(_), Some(_)) => Err(ProtocolError::invalid_response(format!(
            "<{}> has more than one child element",
            node.tag_name().name()
        ))),
    }
}

fn expect_tag(node: Node<'_, '_>, name: &str) -> Result<(), ProtocolError> {
    if node.tag_name().name() == name {
        Ok(())
    } else {
        Err(ProtocolError::invalid_response(format!(
            "expected <{}>, found <{}>",
            name,
            node.tag_name().name()
        )))
    }
}
