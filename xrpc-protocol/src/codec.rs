//! Value encoding and decoding.
//!
//! Encoding writes `<value>` fragments as text. Decoding works on parsed
//! `<value>` elements so the envelope parser can hand over subtrees
//! without re-serializing them.

use crate::error::ProtocolError;
use crate::flags::Capabilities;
use crate::value::{Struct, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{NaiveDateTime, Timelike};
use roxmltree::Node;
use std::fmt::Write as _;

/// `dateTime.iso8601` wire format (basic date, extended time).
pub const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%S";

/// Formats accepted when decoding `dateTime.iso8601`, tried in order.
const DATETIME_DECODE_FORMATS: &[&str] = &[DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y%m%dT%H%M%S"];

/// Deepest struct/array nesting accepted when decoding.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Encodes and decodes values under a fixed capability set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCodec {
    caps: Capabilities,
}

impl ValueCodec {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Encodes a value as a `<value>` fragment.
    pub fn encode(&self, value: &Value) -> Result<String, ProtocolError> {
        let mut out = String::new();
        self.encode_into(value, &mut out)?;
        Ok(out)
    }

    /// Appends a `<value>` fragment to `out`.
    pub fn encode_into(&self, value: &Value, out: &mut String) -> Result<(), ProtocolError> {
        out.push_str("<value>");
        match value {
            Value::Int32(v) => {
                let _ = write!(out, "<int>{}</int>", v);
            }
            Value::Int64(v) => {
                if self.caps.allows_i8() {
                    let _ = write!(out, "<i8>{}</i8>", v);
                } else {
                    let v = i32::try_from(*v).map_err(|_| {
                        ProtocolError::unsupported(format!(
                            "{} does not fit in 4 bytes and 8-byte integers are disabled",
                            v
                        ))
                    })?;
                    let _ = write!(out, "<int>{}</int>", v);
                }
            }
            Value::Double(v) => {
                if !v.is_finite() {
                    return Err(ProtocolError::unsupported(format!(
                        "double {} has no XML-RPC representation",
                        v
                    )));
                }
                // Display for f64 never uses exponent notation.
                let _ = write!(out, "<double>{}</double>", v);
            }
            Value::Bool(v) => {
                out.push_str(if *v { "<boolean>1</boolean>" } else { "<boolean>0</boolean>" });
            }
            Value::Str(s) => {
                out.push_str("<string>");
                escape_into(s, out)?;
                out.push_str("</string>");
            }
            Value::DateTime(dt) => {
                if dt.nanosecond() != 0 {
                    return Err(ProtocolError::unsupported(format!(
                        "{} has fractional seconds, dateTime.iso8601 carries whole seconds",
                        dt
                    )));
                }
                let _ = write!(
                    out,
                    "<dateTime.iso8601>{}</dateTime.iso8601>",
                    dt.format(DATETIME_FORMAT)
                );
            }
            Value::Bytes(data) => {
                out.push_str("<base64>");
                out.push_str(&BASE64.encode(data));
                out.push_str("</base64>");
            }
            Value::Struct(members) => {
                out.push_str("<struct>");
                for (name, member) in members.iter() {
                    out.push_str("<member><name>");
                    escape_into(name, out)?;
                    out.push_str("</name>");
                    self.encode_into(member, out)?;
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            Value::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    self.encode_into(item, out)?;
                }
                out.push_str("</data></array>");
            }
            Value::Nil => {
                if !self.caps.allows_nil() {
                    return Err(ProtocolError::unsupported(
                        "nil values are disabled for this client",
                    ));
                }
                out.push_str("<nil/>");
            }
        }
        out.push_str("</value>");
        Ok(())
    }

    /// Decodes a `<value>` element.
    pub fn decode(&self, node: Node<'_, '_>) -> Result<Value, ProtocolError> {
        self.decode_value(node, 0)
    }

    /// Parses a standalone `<value>` document and decodes it.
    pub fn decode_str(&self, xml: &str) -> Result<Value, ProtocolError> {
        let doc = roxmltree::Document::parse(xml)?;
        self.decode(doc.root_element())
    }

    fn decode_value(&self, node: Node<'_, '_>, depth: usize) -> Result<Value, ProtocolError> {
        if node.tag_name().name() != "value" {
            return Err(ProtocolError::malformed(format!(
                "expected <value>, found <{}>",
                node.tag_name().name()
            )));
        }
        if depth > MAX_NESTING_DEPTH {
            return Err(ProtocolError::malformed(format!(
                "values nested deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }

        let mut elements = node.children().filter(|n| n.is_element());
        let typed = elements.next();
        if elements.next().is_some() {
            return Err(ProtocolError::malformed(
                "<value> contains more than one type element",
            ));
        }

        match typed {
            // No type element: implicit string.
            None => Ok(Value::Str(text_of(node))),
            Some(child) => self.decode_typed(child, depth),
        }
    }

    fn decode_typed(&self, node: Node<'_, '_>, depth: usize) -> Result<Value, ProtocolError> {
        let tag = node.tag_name().name();
        match tag {
            "int" | "i4" => parse_number::<i32>(tag, &text_of(node)).map(Value::Int32),
            "i8" => parse_number::<i64>(tag, &text_of(node)).map(Value::Int64),
            "double" => parse_number::<f64>(tag, &text_of(node)).map(Value::Double),
            "boolean" => match text_of(node).trim() {
                "0" => Ok(Value::Bool(false)),
                "1" => Ok(Value::Bool(true)),
                other => Err(ProtocolError::malformed(format!(
                    "invalid <boolean> value {:?}",
                    other
                ))),
            },
            "string" => Ok(Value::Str(text_of(node))),
            "dateTime.iso8601" => parse_datetime(&text_of(node)).map(Value::DateTime),
            "base64" => {
                let text: String = text_of(node)
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                BASE64
                    .decode(text.as_bytes())
                    .map(Value::Bytes)
                    .map_err(|e| ProtocolError::malformed(format!("invalid <base64>: {}", e)))
            }
            "struct" => self.decode_struct(node, depth),
            "array" => self.decode_array(node, depth),
            "nil" => {
                if self.caps.allows_nil() {
                    Ok(Value::Nil)
                } else {
                    Err(ProtocolError::malformed(
                        "<nil/> received but nil values are disabled for this client",
                    ))
                }
            }
            other => Err(ProtocolError::malformed(format!(
                "unknown type tag <{}>",
                other
            ))),
        }
    }

    fn decode_struct(&self, node: Node<'_, '_>, depth: usize) -> Result<Value, ProtocolError> {
        let mut members = Struct::new();
        for member in node.children().filter(|n| n.is_element()) {
            if member.tag_name().name() != "member" {
                return Err(ProtocolError::malformed(format!(
                    "unexpected <{}> in <struct>",
                    member.tag_name().name()
                )));
            }
            let name = child_element(member, "name")
                .ok_or_else(|| ProtocolError::malformed("struct member without <name>"))?;
            let value = child_element(member, "value")
                .ok_or_else(|| ProtocolError::malformed("struct member without <value>"))?;
            members.insert(text_of(name), self.decode_value(value, depth + 1)?);
        }
        Ok(Value::Struct(members))
    }

    fn decode_array(&self, node: Node<'_, '_>, depth: usize) -> Result<Value, ProtocolError> {
        let data = child_element(node, "data")
            .ok_or_else(|| ProtocolError::malformed("<array> without <data>"))?;
        let mut items = Vec::new();
        for item in data.children().filter(|n| n.is_element()) {
            items.push(self.decode_value(item, depth + 1)?);
        }
        Ok(Value::Array(items))
    }
}

/// Escapes text for use as XML character data.
pub fn escape(text: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(text.len());
    escape_into(text, &mut out)?;
    Ok(out)
}

pub(crate) fn escape_into(text: &str, out: &mut String) -> Result<(), ProtocolError> {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            // Parsers normalize a literal CR away.
            '\r' => out.push_str("&#xD;"),
            c if is_xml_char(c) => out.push(c),
            c => {
                return Err(ProtocolError::unsupported(format!(
                    "character U+{:04X} cannot appear in XML",
                    c as u32
                )))
            }
        }
    }
    Ok(())
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Concatenated text (and CDATA) content of an element's direct children.
pub(crate) fn text_of(node: Node<'_, '_>) -> String {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

pub(crate) fn child_element<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn parse_number<T: std::str::FromStr>(tag: &str, text: &str) -> Result<T, ProtocolError> {
    text.trim()
        .parse::<T>()
        .map_err(|_| ProtocolError::malformed(format!("invalid <{}> value {:?}", tag, text)))
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime, ProtocolError> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    DATETIME_DECODE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| {
            ProtocolError::malformed(format!("invalid <dateTime.iso8601> value {:?}", text))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn codec() -> ValueCodec {
        ValueCodec::new(Capabilities::new())
    }

    fn full_codec() -> ValueCodec {
        ValueCodec::new(Capabilities::new().with_i8().with_nil())
    }

    fn roundtrip(codec: &ValueCodec, value: &Value) -> Value {
        let xml = codec.encode(value).unwrap();
        codec.decode_str(&xml).unwrap()
    }

    #[test]
    fn test_encode_scalars() {
        let c = codec();
        assert_eq!(c.encode(&Value::Int32(-1)).unwrap(), "<value><int>-1</int></value>");
        assert_eq!(
            c.encode(&Value::Bool(true)).unwrap(),
            "<value><boolean>1</boolean></value>"
        );
        assert_eq!(
            c.encode(&Value::Double(1.5)).unwrap(),
            "<value><double>1.5</double></value>"
        );
        assert_eq!(
            c.encode(&Value::from("a<b&c>")).unwrap(),
            "<value><string>a&lt;b&amp;c&gt;</string></value>"
        );
        assert_eq!(
            c.encode(&Value::bytes(b"hello".to_vec())).unwrap(),
            "<value><base64>aGVsbG8=</base64></value>"
        );
    }

    #[test]
    fn test_encode_datetime() {
        let dt = NaiveDate::from_ymd_opt(1998, 7, 17)
            .unwrap()
            .and_hms_opt(14, 8, 55)
            .unwrap();
        assert_eq!(
            codec().encode(&Value::DateTime(dt)).unwrap(),
            "<value><dateTime.iso8601>19980717T14:08:55</dateTime.iso8601></value>"
        );
    }

    #[test]
    fn test_encode_compound() {
        let value = Value::Struct(
            Struct::new()
                .with("list", vec![Value::Int32(1), Value::from("two")])
                .with("empty", Struct::new()),
        );
        assert_eq!(
            codec().encode(&value).unwrap(),
            "<value><struct>\
             <member><name>list</name><value><array><data>\
             <value><int>1</int></value><value><string>two</string></value>\
             </data></array></value></member>\
             <member><name>empty</name><value><struct></struct></value></member>\
             </struct></value>"
        );
    }

    #[test]
    fn test_large_double_has_no_exponent() {
        let xml = codec().encode(&Value::Double(1e21)).unwrap();
        assert_eq!(xml, "<value><double>1000000000000000000000</double></value>");
        let xml = codec().encode(&Value::Double(1e-7)).unwrap();
        assert_eq!(xml, "<value><double>0.0000001</double></value>");
    }

    #[test]
    fn test_non_finite_double_is_unsupported() {
        assert!(matches!(
            codec().encode(&Value::Double(f64::NAN)),
            Err(ProtocolError::UnsupportedValue(_))
        ));
        assert!(matches!(
            codec().encode(&Value::Double(f64::INFINITY)),
            Err(ProtocolError::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_fractional_seconds_are_unsupported() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 678)
            .unwrap();
        assert!(matches!(
            codec().encode(&Value::DateTime(dt)),
            Err(ProtocolError::UnsupportedValue(_))
        ));

        let whole = dt.with_nanosecond(0).unwrap();
        assert_eq!(roundtrip(&codec(), &Value::DateTime(whole)), Value::DateTime(whole));
    }

    #[test]
    fn test_decode_wide_struct() {
        let mut xml = String::from("<value><struct>");
        for i in 0..40_000 {
            xml.push_str(&format!(
                "<member><name>m{}</name><value><int>{}</int></value></member>",
                i, i
            ));
        }
        xml.push_str("<member><name>m0</name><value><int>-1</int></value></member>");
        xml.push_str("</struct></value>");

        let start = std::time::Instant::now();
        let value = codec().decode_str(&xml).unwrap();
        assert!(start.elapsed() < std::time::Duration::from_secs(5));

        let members = value.as_struct().unwrap();
        assert_eq!(members.len(), 40_000);
        assert_eq!(members.get("m0"), Some(&Value::Int32(-1)));
        assert_eq!(members.get("m39999"), Some(&Value::Int32(39_999)));
    }

    #[test]
    fn test_nil_gated_by_capability() {
        let err = codec().encode(&Value::Nil).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedValue(_)));

        let nil_codec = ValueCodec::new(Capabilities::new().with_nil());
        assert_eq!(nil_codec.encode(&Value::Nil).unwrap(), "<value><nil/></value>");
        assert_eq!(roundtrip(&nil_codec, &Value::Nil), Value::Nil);
    }

    #[test]
    fn test_nested_nil_gated_by_capability() {
        let value = Value::Array(vec![Value::Int32(1), Value::Nil]);
        assert!(matches!(
            codec().encode(&value),
            Err(ProtocolError::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_decode_nil_without_capability_fails() {
        let err = codec().decode_str("<value><nil/></value>").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedValue(_)));
    }

    #[test]
    fn test_i64_gating() {
        let c = codec();
        assert_eq!(
            c.encode(&Value::Int64(42)).unwrap(),
            "<value><int>42</int></value>"
        );
        let err = c.encode(&Value::Int64(i64::from(i32::MAX) + 1)).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedValue(_)));

        let c8 = ValueCodec::new(Capabilities::new().with_i8());
        assert_eq!(
            c8.encode(&Value::Int64(i64::MAX)).unwrap(),
            "<value><i8>9223372036854775807</i8></value>"
        );
    }

    #[test]
    fn test_decode_i8_is_lenient() {
        let v = codec().decode_str("<value><i8>5000000000</i8></value>").unwrap();
        assert_eq!(v, Value::Int64(5_000_000_000));
    }

    #[test]
    fn test_decode_i4_alias() {
        let v = codec().decode_str("<value><i4> 17 </i4></value>").unwrap();
        assert_eq!(v, Value::Int32(17));
    }

    #[test]
    fn test_decode_implicit_string() {
        assert_eq!(
            codec().decode_str("<value>plain &amp; simple</value>").unwrap(),
            Value::from("plain & simple")
        );
        assert_eq!(codec().decode_str("<value/>").unwrap(), Value::from(""));
        assert_eq!(
            codec().decode_str("<value><string/></value>").unwrap(),
            Value::from("")
        );
    }

    #[test]
    fn test_decode_ignores_whitespace_around_type() {
        let v = codec()
            .decode_str("<value>\n   <int>3</int>\n</value>")
            .unwrap();
        assert_eq!(v, Value::Int32(3));
    }

    #[test]
    fn test_decode_string_keeps_whitespace() {
        let v = codec()
            .decode_str("<value><string>  padded  </string></value>")
            .unwrap();
        assert_eq!(v, Value::from("  padded  "));
    }

    #[test]
    fn test_decode_cdata() {
        let v = codec()
            .decode_str("<value><string><![CDATA[<raw>]]></string></value>")
            .unwrap();
        assert_eq!(v, Value::from("<raw>"));
    }

    #[test]
    fn test_decode_base64_with_line_breaks() {
        let v = codec()
            .decode_str("<value><base64>aGVs\n  bG8g\r\nd29y bGQ=</base64></value>")
            .unwrap();
        assert_eq!(v, Value::bytes(b"hello world".to_vec()));
    }

    #[test]
    fn test_decode_datetime_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 1)
            .unwrap();
        for text in [
            "20240229T23:59:01",
            "2024-02-29T23:59:01",
            "20240229T235901",
            " 20240229T23:59:01Z ",
        ] {
            let xml = format!("<value><dateTime.iso8601>{}</dateTime.iso8601></value>", text);
            assert_eq!(
                codec().decode_str(&xml).unwrap(),
                Value::DateTime(expected),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_decode_malformed_values() {
        let cases = [
            "<value><int>abc</int></value>",
            "<value><int>2147483648</int></value>",
            "<value><double>1.2.3</double></value>",
            "<value><boolean>true</boolean></value>",
            "<value><dateTime.iso8601>yesterday</dateTime.iso8601></value>",
            "<value><base64>!!!</base64></value>",
            "<value><float>1.0</float></value>",
            "<value><int>1</int><int>2</int></value>",
            "<value><struct><member><value><int>1</int></value></member></struct></value>",
            "<value><struct><member><name>a</name></member></struct></value>",
            "<value><struct><item/></struct></value>",
            "<value><array><value><int>1</int></value></array></value>",
            "<value><array><data><int>1</int></data></array></value>",
        ];
        for xml in cases {
            let err = codec().decode_str(xml).unwrap_err();
            assert!(
                matches!(err, ProtocolError::MalformedValue(_)),
                "{} gave {:?}",
                xml,
                err
            );
        }
    }

    #[test]
    fn test_decode_rejects_non_value_root() {
        let err = codec().decode_str("<int>1</int>").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedValue(_)));
    }

    #[test]
    fn test_decode_depth_limit() {
        let depth = MAX_NESTING_DEPTH + 2;
        let mut xml = String::new();
        for _ in 0..depth {
            xml.push_str("<value><array><data>");
        }
        for _ in 0..depth {
            xml.push_str("</data></array></value>");
        }
        let err = codec().decode_str(&xml).unwrap_err();
        assert!(err.to_string().contains("nested deeper"));
    }

    #[test]
    fn test_struct_member_order_preserved_on_decode() {
        let xml = "<value><struct>\
                   <member><name>b</name><value><int>2</int></value></member>\
                   <member><name>a</name><value><int>1</int></value></member>\
                   </struct></value>";
        let v = codec().decode_str(xml).unwrap();
        let names: Vec<_> = v.as_struct().unwrap().iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_escape_rejects_control_characters() {
        assert!(escape("bell\u{7}").is_err());
        assert_eq!(escape("tab\tline\n").unwrap(), "tab\tline\n");
        assert_eq!(escape("cr\r").unwrap(), "cr&#xD;");
    }

    #[test]
    fn test_boundary_values_roundtrip() {
        let c = full_codec();
        for v in [
            Value::Int32(0),
            Value::Int32(-1),
            Value::Int32(i32::MAX),
            Value::Int32(i32::MIN),
            Value::Int64(i64::MAX),
            Value::Int64(i64::MIN),
            Value::from(""),
            Value::Struct(Struct::new()),
            Value::Array(vec![]),
            Value::bytes(Vec::new()),
        ] {
            assert_eq!(roundtrip(&c, &v), v);
        }
    }

    #[test]
    fn test_nested_struct_array_struct_roundtrip() {
        let inner = Struct::new().with("id", 7).with("tags", vec![Value::from("x")]);
        let value = Value::Struct(
            Struct::new()
                .with("items", vec![Value::Struct(inner.clone()), Value::Struct(inner)])
                .with("count", 2),
        );
        assert_eq!(roundtrip(&codec(), &value), value);
    }

    fn arb_datetime() -> impl Strategy<Value = NaiveDateTime> {
        (1000i32..=9999, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60).prop_map(
            |(y, mo, d, h, mi, s)| {
                NaiveDate::from_ymd_opt(y, mo, d)
                    .unwrap()
                    .and_hms_opt(h, mi, s)
                    .unwrap()
            },
        )
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<i32>().prop_map(Value::Int32),
            any::<i64>().prop_map(Value::Int64),
            any::<f64>()
                .prop_filter("finite", |f| f.is_finite())
                .prop_map(Value::Double),
            any::<bool>().prop_map(Value::Bool),
            "[^\u{0}-\u{8}\u{b}\u{c}\u{e}-\u{1f}\u{fffe}\u{ffff}]*".prop_map(Value::Str),
            arb_datetime().prop_map(Value::DateTime),
            proptest::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
            Just(Value::Nil),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                proptest::collection::vec(("[a-zA-Z_][a-zA-Z0-9_]{0,8}", inner), 0..6)
                    .prop_map(|members| Value::Struct(members.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_roundtrip_with_all_extensions(value in arb_value()) {
            let c = full_codec();
            let xml = c.encode(&value).unwrap();
            prop_assert_eq!(c.decode_str(&xml).unwrap(), value);
        }
    }
}
