use std::fmt::Write as _;

use base64::Engine as _;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use super::{
    AttributeKind, MethodAttribute, MethodDescriptor, MethodShape, ParameterDescriptor,
    ParameterDirection, ParameterType,
};
use crate::{Result, SoapError, serializer::XmlTypeCode};

/// Keys longer than this are replaced by their SHA-256 digest.
pub const DEFAULT_KEY_LENGTH_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: String,
    pub type_code: XmlTypeCode,
    /// Position in the declared signature.
    pub position: usize,
}

/// Normalized signature of a service method or of an async begin/end pair.
#[derive(Debug, Clone)]
pub struct MethodContract {
    name: String,
    message_name: String,
    declaring_type: String,
    in_params: Vec<ParameterInfo>,
    out_params: Vec<ParameterInfo>,
    return_type: Option<XmlTypeCode>,
    is_async: bool,
    attributes: Vec<MethodAttribute>,
}

impl MethodContract {
    pub fn build(shape: &MethodShape) -> Result<Self> {
        match shape {
            MethodShape::Sync(method) => Self::build_sync(method),
            MethodShape::Async { begin, end } => Self::build_async(begin, end),
        }
    }

    #[instrument(skip(method), fields(method = %method.name))]
    pub fn build_sync(method: &MethodDescriptor) -> Result<Self> {
        check_instance(method)?;

        let mut in_params = Vec::new();
        let mut out_params = Vec::new();
        for (position, parameter) in method.parameters.iter().enumerate() {
            let type_code = xml_type(method, parameter)?;
            let info = ParameterInfo {
                name: parameter.name.clone(),
                type_code,
                position,
            };
            match parameter.direction {
                ParameterDirection::In => in_params.push(info),
                ParameterDirection::Out | ParameterDirection::Ref => out_params.push(info),
            }
        }

        let contract = Self {
            name: method.name.clone(),
            message_name: method.message_name.clone().unwrap_or_else(|| method.name.clone()),
            declaring_type: method.declaring_type.clone(),
            in_params,
            out_params,
            return_type: method.return_type.clone(),
            is_async: false,
            attributes: merge_attributes(method)?,
        };
        debug!(key = %contract.to_key(), "Built method contract");
        Ok(contract)
    }

    #[instrument(skip(begin, end), fields(begin = %begin.name, end = %end.name))]
    pub fn build_async(begin: &MethodDescriptor, end: &MethodDescriptor) -> Result<Self> {
        check_instance(begin)?;
        check_instance(end)?;

        let count = begin.parameters.len();
        let trailing = begin.parameters.get(count.saturating_sub(2)..).unwrap_or_default();
        let is_callback_then_state = matches!(
            trailing,
            [callback, state]
                if callback.parameter_type == ParameterType::AsyncCallback
                    && state.parameter_type == ParameterType::AsyncState
        );
        if !is_callback_then_state {
            return Err(SoapError::contract(
                &begin.name,
                "the last two parameters of a begin method must be the callback and the state",
            ));
        }

        if !matches!(
            end.parameters.first(),
            Some(parameter) if parameter.parameter_type == ParameterType::AsyncResult
        ) {
            return Err(SoapError::contract(
                &end.name,
                "the first parameter of an end method must be the async result",
            ));
        }

        let mut in_params = Vec::new();
        for (position, parameter) in begin.parameters[..count - 2].iter().enumerate() {
            if parameter.direction != ParameterDirection::In {
                return Err(SoapError::contract(
                    &begin.name,
                    format!("parameter {} of a begin method cannot be out or by-ref", parameter.name),
                ));
            }
            in_params.push(ParameterInfo {
                name: parameter.name.clone(),
                type_code: xml_type(begin, parameter)?,
                position,
            });
        }

        let mut out_params = Vec::new();
        for (position, parameter) in end.parameters.iter().enumerate().skip(1) {
            out_params.push(ParameterInfo {
                name: parameter.name.clone(),
                type_code: xml_type(end, parameter)?,
                position,
            });
        }

        let name = begin
            .name
            .strip_prefix("Begin")
            .filter(|name| !name.is_empty())
            .unwrap_or(&begin.name)
            .to_owned();

        Ok(Self {
            message_name: begin.message_name.clone().unwrap_or_else(|| name.clone()),
            name,
            declaring_type: begin.declaring_type.clone(),
            in_params,
            out_params,
            return_type: end.return_type.clone(),
            is_async: true,
            attributes: merge_attributes(begin)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_name(&self) -> &str {
        &self.message_name
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn in_params(&self) -> &[ParameterInfo] {
        &self.in_params
    }

    pub fn out_params(&self) -> &[ParameterInfo] {
        &self.out_params
    }

    pub fn return_type(&self) -> Option<&XmlTypeCode> {
        self.return_type.as_ref()
    }

    pub fn is_void(&self) -> bool {
        self.return_type.is_none()
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Attributes of `kind`, merged across declaration and implementation.
    pub fn custom_attributes(&self, kind: AttributeKind) -> impl Iterator<Item = &MethodAttribute> {
        self.attributes
            .iter()
            .filter(move |attribute| attribute.kind() == kind)
    }

    pub fn to_key(&self) -> String {
        self.to_key_with_threshold(DEFAULT_KEY_LENGTH_THRESHOLD)
    }

    /// Stable identity of the method: declaring type and signature.
    pub fn to_key_with_threshold(&self, threshold: usize) -> String {
        let params = self
            .in_params
            .iter()
            .map(|param| ("", param.type_code.type_name()))
            .chain(self.out_params.iter().map(|param| ("out ", param.type_code.type_name())));
        signature_key(
            &self.declaring_type,
            &self.name,
            params,
            self.return_type.as_ref(),
            threshold,
        )
    }
}

impl MethodShape {
    /// Key of the declared signature, usable before the contract is built.
    pub fn to_key(&self) -> String {
        let (method, return_type) = match self {
            MethodShape::Sync(method) => (method, method.return_type.as_ref()),
            MethodShape::Async { begin, end } => (begin, end.return_type.as_ref()),
        };
        let params = method.parameters.iter().map(|param| {
            let marker = match param.direction {
                ParameterDirection::In => "",
                ParameterDirection::Out => "out ",
                ParameterDirection::Ref => "ref ",
            };
            let type_name = match &param.parameter_type {
                ParameterType::Xml(type_code) => type_code.type_name(),
                ParameterType::AsyncCallback => "callback".to_owned(),
                ParameterType::AsyncState => "state".to_owned(),
                ParameterType::AsyncResult => "result".to_owned(),
            };
            (marker, type_name)
        });
        signature_key(
            &method.declaring_type,
            &method.name,
            params,
            return_type,
            DEFAULT_KEY_LENGTH_THRESHOLD,
        )
    }
}

fn signature_key<'a>(
    declaring_type: &str,
    name: &str,
    params: impl Iterator<Item = (&'a str, String)>,
    return_type: Option<&XmlTypeCode>,
    threshold: usize,
) -> String {
    let mut key = format!("{declaring_type}:{name}(");
    for (index, (marker, type_name)) in params.enumerate() {
        if index > 0 {
            key.push(',');
        }
        let _ = write!(key, "{marker}{type_name}");
    }
    key.push(')');
    if let Some(return_type) = return_type {
        let _ = write!(key, "->{}", return_type.type_name());
    }
    bounded_key(key, threshold)
}

fn bounded_key(key: String, threshold: usize) -> String {
    if key.len() <= threshold {
        return key;
    }
    let digest = Sha256::digest(key.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

fn check_instance(method: &MethodDescriptor) -> Result<()> {
    if method.is_static {
        return Err(SoapError::contract(
            &method.name,
            "service methods must be instance methods",
        ));
    }
    Ok(())
}

fn xml_type(method: &MethodDescriptor, parameter: &ParameterDescriptor) -> Result<XmlTypeCode> {
    match &parameter.parameter_type {
        ParameterType::Xml(type_code) => Ok(type_code.clone()),
        _ => Err(SoapError::contract(
            &method.name,
            format!("parameter {} has an async-only type", parameter.name),
        )),
    }
}

fn merge_attributes(method: &MethodDescriptor) -> Result<Vec<MethodAttribute>> {
    let Some(declaration) = &method.declaration else {
        return Ok(method.attributes.clone());
    };

    let mut merged = declaration.attributes.clone();
    for attribute in &method.attributes {
        if !attribute.kind().is_mergeable() {
            return Err(SoapError::contract(
                &method.name,
                format!(
                    "{:?} attributes belong on the declaration of {}, not on its implementation",
                    attribute.kind(),
                    declaration.declaring_type
                ),
            ));
        }
        merged.push(attribute.clone());
    }
    Ok(merged)
}
