//! Members-mapping serializer.
//!
//! Parameters, return values and header values travel as [`Value`]s. A
//! [`XmlMembersMapping`] names the XML element for each member and carries the
//! type needed to read it back.
use ironsoap_xml::{
    QualifiedName,
    builder::{Attribute, Element},
    parser::{Node, child_elements, text_content},
};
use tracing::{debug, trace};

use crate::{
    Result, SoapError,
    contract::SoapBindingUse,
    version::{SoapVersion, XSD_NAMESPACE, XSI_NAMESPACE},
};

const XSI_PREFIX: &str = "xsi";
const XSD_PREFIX: &str = "xsd";
const SOAPENC_PREFIX: &str = "soapenc";
const TYPES_PREFIX: &str = "types";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Field of a struct value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<(String, XmlTypeCode)>,
}

impl StructType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, type_code: XmlTypeCode) -> Self {
        self.fields.push((name.into(), type_code));
        self
    }

    fn field_type(&self, name: &str) -> Option<&XmlTypeCode> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, type_code)| type_code)
    }
}

/// Wire type of a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlTypeCode {
    Boolean,
    Int,
    Double,
    String,
    Array(Box<XmlTypeCode>),
    Struct(StructType),
}

impl XmlTypeCode {
    pub fn array_of(item: XmlTypeCode) -> Self {
        XmlTypeCode::Array(Box::new(item))
    }

    /// Schema name used for `xsi:type` and for literal array items.
    pub fn type_name(&self) -> String {
        match self {
            XmlTypeCode::Boolean => "boolean".to_owned(),
            XmlTypeCode::Int => "int".to_owned(),
            XmlTypeCode::Double => "double".to_owned(),
            XmlTypeCode::String => "string".to_owned(),
            XmlTypeCode::Array(item) => {
                let mut item_name = item.type_name();
                if let Some(first) = item_name.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                format!("ArrayOf{item_name}")
            }
            XmlTypeCode::Struct(structure) => structure.name.clone(),
        }
    }

    /// Qualified `xsi:type` text, using the prefixes the envelope declares.
    fn xsi_type(&self) -> String {
        match self {
            XmlTypeCode::Struct(structure) => format!("{TYPES_PREFIX}:{}", structure.name),
            XmlTypeCode::Array(_) => format!("{SOAPENC_PREFIX}:Array"),
            scalar => format!("{XSD_PREFIX}:{}", scalar.type_name()),
        }
    }
}

/// One member of a [`XmlMembersMapping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlMemberMapping {
    pub name: String,
    pub namespace: Option<String>,
    pub type_code: XmlTypeCode,
}

impl XmlMemberMapping {
    pub fn new(name: impl Into<String>, type_code: XmlTypeCode) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            type_code,
        }
    }

    pub fn qualified(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn element_name(&self) -> QualifiedName {
        QualifiedName::new(self.name.clone(), self.namespace.clone().unwrap_or_default())
    }
}

/// Receives elements the mapping has no member for.
pub trait UnknownNodeHook {
    fn unknown_element(&mut self, name: QualifiedName);
}

impl<F: FnMut(QualifiedName)> UnknownNodeHook for F {
    fn unknown_element(&mut self, name: QualifiedName) {
        self(name)
    }
}

/// Hook that only logs what it skips.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreUnknownNodes;

impl UnknownNodeHook for IgnoreUnknownNodes {
    fn unknown_element(&mut self, name: QualifiedName) {
        debug!(element = %name, "Skipping unknown element");
    }
}

/// Maps an ordered list of values onto XML elements.
///
/// A wrapped mapping writes its members inside `element`; a bare mapping
/// writes them directly into the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlMembersMapping {
    pub element: Option<QualifiedName>,
    pub members: Vec<XmlMemberMapping>,
    pub binding_use: SoapBindingUse,
    pub wrapped: bool,
    /// Namespace of struct types named by `xsi:type` under encoded use.
    pub types_namespace: String,
}

impl XmlMembersMapping {
    pub fn wrapped(
        element: QualifiedName,
        members: Vec<XmlMemberMapping>,
        binding_use: SoapBindingUse,
    ) -> Self {
        Self {
            element: Some(element),
            members,
            binding_use,
            wrapped: true,
            types_namespace: String::new(),
        }
    }

    pub fn bare(members: Vec<XmlMemberMapping>, binding_use: SoapBindingUse) -> Self {
        Self {
            element: None,
            members,
            binding_use,
            wrapped: false,
            types_namespace: String::new(),
        }
    }

    pub fn with_types_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.types_namespace = namespace.into();
        self
    }

    pub fn is_encoded(&self) -> bool {
        self.binding_use == SoapBindingUse::Encoded
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Index of the member written as `name`. Falls back to the local name so
    /// peers that qualify (or don't qualify) member elements differently still match.
    pub fn member_index(&self, name: &QualifiedName) -> Option<usize> {
        self.members
            .iter()
            .position(|member| member.element_name() == *name)
            .or_else(|| {
                self.members
                    .iter()
                    .position(|member| member.name == name.name())
            })
    }

    pub fn serialize(&self, values: &[Value], version: SoapVersion) -> Result<Vec<Element<'static>>> {
        if values.len() > self.members.len() {
            return Err(SoapError::serialization(format!(
                "{} values given for {} members",
                values.len(),
                self.members.len()
            )));
        }

        let mut elements = Vec::with_capacity(self.members.len());
        for (index, member) in self.members.iter().enumerate() {
            // Missing trailing values are written as nil.
            let value = values.get(index).unwrap_or(&Value::Null);
            elements.push(self.write_member(member, value, version)?);
        }

        match (&self.element, self.wrapped) {
            (Some(element), true) => {
                let wrapper = Element::new(element.name().to_owned())
                    .set_namespace_optional(element.namespace_opt().map(str::to_owned))
                    .add_children(elements);
                Ok(vec![wrapper])
            }
            _ => Ok(elements),
        }
    }

    /// Writes a single member, as used for header blocks.
    pub fn serialize_member(
        &self,
        index: usize,
        value: &Value,
        version: SoapVersion,
    ) -> Result<Element<'static>> {
        let member = self.members.get(index).ok_or(SoapError::IndexOutOfRange {
            what: "members",
            index,
            count: self.members.len(),
        })?;
        self.write_member(member, value, version)
    }

    /// Reads the members out of `parent`.
    ///
    /// For a wrapped mapping `parent` is the wrapper element. Members that are
    /// absent come back as [`Value::Null`]; elements without a member go to `hook`.
    pub fn deserialize(&self, parent: Node<'_, '_>, hook: &mut dyn UnknownNodeHook) -> Result<Vec<Value>> {
        if let (Some(element), true) = (&self.element, self.wrapped) {
            if element.name() != parent.tag_name().name() {
                return Err(SoapError::serialization(format!(
                    "expected element {element}, found {}",
                    QualifiedName::from_node(parent)
                )));
            }
        }

        let mut values = vec![Value::Null; self.members.len()];
        for child in child_elements(parent) {
            let name = QualifiedName::from_node(child);
            match self.member_index(&name) {
                Some(index) => {
                    values[index] = self.read_value(child, &self.members[index].type_code, hook)?;
                }
                None => hook.unknown_element(name),
            }
        }
        trace!(count = values.len(), "Deserialized members");
        Ok(values)
    }

    pub fn deserialize_member(
        &self,
        index: usize,
        node: Node<'_, '_>,
        hook: &mut dyn UnknownNodeHook,
    ) -> Result<Value> {
        let member = self.members.get(index).ok_or(SoapError::IndexOutOfRange {
            what: "members",
            index,
            count: self.members.len(),
        })?;
        self.read_value(node, &member.type_code, hook)
    }

    fn write_member(
        &self,
        member: &XmlMemberMapping,
        value: &Value,
        version: SoapVersion,
    ) -> Result<Element<'static>> {
        let element = Element::new(member.name.clone())
            .set_namespace_optional(member.namespace.clone());
        self.write_value(element, member.namespace.as_deref(), &member.type_code, value, version)
    }

    fn write_value(
        &self,
        element: Element<'static>,
        namespace: Option<&str>,
        type_code: &XmlTypeCode,
        value: &Value,
        version: SoapVersion,
    ) -> Result<Element<'static>> {
        if value.is_null() {
            return Ok(element
                .add_namespace_declaration(XSI_NAMESPACE, Some(XSI_PREFIX))
                .add_attribute(Attribute::new_with_namespace("nil", "true", Some(XSI_NAMESPACE))));
        }

        let element = if self.is_encoded() {
            self.with_type_attributes(element, type_code, value, version)
        } else {
            element
        };

        match (type_code, value) {
            (XmlTypeCode::Boolean, Value::Bool(flag)) => Ok(element.set_text(flag.to_string())),
            (XmlTypeCode::Int, Value::Int(number)) => Ok(element.set_text(number.to_string())),
            (XmlTypeCode::Double, Value::Double(_) | Value::Int(_)) => {
                let number = value.as_f64().unwrap_or_default();
                Ok(element.set_text(format_double(number)))
            }
            (XmlTypeCode::String, Value::String(text)) => Ok(element.set_text(text.clone())),
            (XmlTypeCode::Array(item_type), Value::Array(items)) => {
                let item_name = item_type.type_name();
                let mut element = element;
                for item in items {
                    let child = Element::new(item_name.clone()).set_namespace_optional(namespace.map(str::to_owned));
                    element = element.add_child(self.write_value(child, namespace, item_type, item, version)?);
                }
                Ok(element)
            }
            (XmlTypeCode::Struct(structure), Value::Struct(fields)) => {
                let mut element = element;
                for (field_name, field_type) in &structure.fields {
                    let Some((_, field_value)) = fields.iter().find(|(name, _)| name == field_name) else {
                        continue;
                    };
                    let child = Element::new(field_name.clone()).set_namespace_optional(namespace.map(str::to_owned));
                    element = element.add_child(self.write_value(child, namespace, field_type, field_value, version)?);
                }
                Ok(element)
            }
            (type_code, value) => Err(SoapError::serialization(format!(
                "cannot write a {} value as {}",
                value.kind(),
                type_code.type_name()
            ))),
        }
    }

    fn with_type_attributes(
        &self,
        element: Element<'static>,
        type_code: &XmlTypeCode,
        value: &Value,
        version: SoapVersion,
    ) -> Element<'static> {
        let mut element = element
            .add_namespace_declaration(XSI_NAMESPACE, Some(XSI_PREFIX))
            .add_attribute(Attribute::new_with_namespace("type", type_code.xsi_type(), Some(XSI_NAMESPACE)));

        match type_code {
            XmlTypeCode::Struct(_) => {
                element = element.add_owned_declaration(self.types_namespace.clone(), TYPES_PREFIX.to_owned());
            }
            XmlTypeCode::Array(item_type) => {
                let count = value.as_array().map_or(0, <[Value]>::len);
                let item = match item_type.as_ref() {
                    XmlTypeCode::Struct(structure) => {
                        element = element.add_owned_declaration(self.types_namespace.clone(), TYPES_PREFIX.to_owned());
                        format!("{TYPES_PREFIX}:{}", structure.name)
                    }
                    XmlTypeCode::Array(_) => format!("{SOAPENC_PREFIX}:Array"),
                    scalar => {
                        element = element.add_namespace_declaration(XSD_NAMESPACE, Some(XSD_PREFIX));
                        format!("{XSD_PREFIX}:{}", scalar.type_name())
                    }
                };
                let encoding = version.encoding_namespace();
                element = element
                    .add_namespace_declaration(encoding, Some(SOAPENC_PREFIX))
                    .add_attribute(Attribute::new_with_namespace(
                        "arrayType",
                        format!("{item}[{count}]"),
                        Some(encoding),
                    ));
            }
            _ => {
                element = element.add_namespace_declaration(XSD_NAMESPACE, Some(XSD_PREFIX));
            }
        }
        element
    }

    fn read_value(
        &self,
        node: Node<'_, '_>,
        type_code: &XmlTypeCode,
        hook: &mut dyn UnknownNodeHook,
    ) -> Result<Value> {
        if matches!(node.attribute((XSI_NAMESPACE, "nil")), Some("true" | "1")) {
            return Ok(Value::Null);
        }

        match type_code {
            XmlTypeCode::Boolean => match text_content(node).trim() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                other => Err(invalid_text(other, type_code)),
            },
            XmlTypeCode::Int => {
                let text = text_content(node);
                text.trim()
                    .parse()
                    .map(Value::Int)
                    .map_err(|_| invalid_text(&text, type_code))
            }
            XmlTypeCode::Double => {
                let text = text_content(node);
                parse_double(text.trim())
                    .map(Value::Double)
                    .ok_or_else(|| invalid_text(&text, type_code))
            }
            XmlTypeCode::String => Ok(Value::String(text_content(node))),
            XmlTypeCode::Array(item_type) => child_elements(node)
                .map(|item| self.read_value(item, item_type, hook))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            XmlTypeCode::Struct(structure) => {
                let mut fields = Vec::new();
                for child in child_elements(node) {
                    let name = child.tag_name().name();
                    match structure.field_type(name) {
                        Some(field_type) => {
                            fields.push((name.to_owned(), self.read_value(child, field_type, hook)?));
                        }
                        None => hook.unknown_element(QualifiedName::from_node(child)),
                    }
                }
                // Declared order, whatever order the peer wrote.
                fields.sort_by_key(|(name, _)| {
                    structure
                        .fields
                        .iter()
                        .position(|(field, _)| field == name)
                        .unwrap_or(usize::MAX)
                });
                Ok(Value::Struct(fields))
            }
        }
    }
}

fn invalid_text(text: &str, type_code: &XmlTypeCode) -> SoapError {
    SoapError::serialization(format!("'{text}' is not a valid {}", type_code.type_name()))
}

fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value == f64::INFINITY {
        "INF".to_owned()
    } else if value == f64::NEG_INFINITY {
        "-INF".to_owned()
    } else {
        value.to_string()
    }
}

fn parse_double(text: &str) -> Option<f64> {
    match text {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        other => other.parse().ok(),
    }
}
