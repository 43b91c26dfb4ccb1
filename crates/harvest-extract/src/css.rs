//! Extraction driven by a JSON schema of CSS selectors.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use harvest_crawler::{ExtractionStrategy, PageLocation};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Serialized form of a CSS extraction schema.
///
/// ```json
/// {
///   "name": "News",
///   "baseSelector": "div.article",
///   "fields": [
///     { "name": "title", "selector": "h2", "type": "text" },
///     { "name": "link", "selector": "a", "type": "attribute", "attribute": "href" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub base_selector: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_fields: Vec<FieldSpec>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Attribute,
    Html,
    Regex,
    Nested,
    List,
    NestedList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Lowercase,
    Uppercase,
    Strip,
}

impl Transform {
    fn apply(self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(match self {
                Self::Lowercase => s.to_lowercase(),
                Self::Uppercase => s.to_uppercase(),
                Self::Strip => s.trim().to_string(),
            }),
            other => other,
        }
    }
}

#[derive(Debug)]
enum Rule {
    Text,
    Attribute(String),
    Html,
    Regex(Regex),
    Nested(Vec<Field>),
    List(Vec<Field>),
    NestedList(Vec<Field>),
}

#[derive(Debug)]
struct Field {
    name: String,
    selector: Option<Selector>,
    rule: Rule,
    default: Option<Value>,
    transform: Option<Transform>,
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {css:?}: {e}"))
}

fn compile_fields(specs: &[FieldSpec]) -> Result<Vec<Field>> {
    specs.iter().map(Field::compile).collect()
}

/// Text content with whitespace runs collapsed.
fn element_text(element: ElementRef) -> String {
    let text = element.text().collect::<String>();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Field {
    fn compile(spec: &FieldSpec) -> Result<Self> {
        let name = &spec.name;
        let selector = spec.selector.as_deref().map(parse_selector).transpose()?;

        let rule = match spec.kind {
            FieldKind::Text => Rule::Text,
            FieldKind::Html => Rule::Html,
            FieldKind::Attribute => Rule::Attribute(
                spec.attribute
                    .clone()
                    .ok_or_else(|| anyhow!("Field {name:?} requires an `attribute`"))?,
            ),
            FieldKind::Regex => {
                let pattern = spec
                    .pattern
                    .as_deref()
                    .ok_or_else(|| anyhow!("Field {name:?} requires a `pattern`"))?;
                Rule::Regex(
                    Regex::new(pattern)
                        .with_context(|| format!("Invalid pattern for field {name:?}"))?,
                )
            }
            kind @ (FieldKind::Nested | FieldKind::List | FieldKind::NestedList) => {
                if selector.is_none() {
                    bail!("Field {name:?} of type {kind:?} requires a `selector`");
                }
                let fields = compile_fields(&spec.fields)?;
                match kind {
                    FieldKind::Nested => Rule::Nested(fields),
                    FieldKind::List => Rule::List(fields),
                    _ => Rule::NestedList(fields),
                }
            }
        };

        Ok(Self {
            name: name.clone(),
            selector,
            rule,
            default: spec.default.clone(),
            transform: spec.transform,
        })
    }

    fn targets<'a>(&self, element: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match &self.selector {
            Some(selector) => element.select(selector).collect(),
            None => vec![element],
        }
    }

    fn extract(&self, element: ElementRef) -> Option<Value> {
        match &self.rule {
            Rule::Nested(fields) => self
                .targets(element)
                .into_iter()
                .next()
                .map(|target| Value::Object(extract_item(target, fields)))
                .or_else(|| self.default.clone()),
            Rule::List(fields) => Some(Value::Array(
                self.targets(element)
                    .into_iter()
                    .map(|target| Value::Object(extract_single_values(target, fields)))
                    .collect(),
            )),
            Rule::NestedList(fields) => Some(Value::Array(
                self.targets(element)
                    .into_iter()
                    .map(|target| Value::Object(extract_item(target, fields)))
                    .collect(),
            )),
            _ => self.single_value(element),
        }
    }

    fn single_value(&self, element: ElementRef) -> Option<Value> {
        let target = match &self.selector {
            Some(selector) => element.select(selector).next(),
            None => Some(element),
        };

        let value = match (&self.rule, target) {
            (_, None) => None,
            (Rule::Text, Some(target)) => Some(Value::String(element_text(target))),
            (Rule::Attribute(attr), Some(target)) => {
                target.value().attr(attr).map(|v| Value::String(v.to_string()))
            }
            (Rule::Html, Some(target)) => Some(Value::String(target.html())),
            (Rule::Regex(re), Some(target)) => {
                let text = element_text(target);
                re.captures(&text)
                    .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
                    .map(|m| Value::String(m.as_str().to_string()))
            }
            (Rule::Nested(_) | Rule::List(_) | Rule::NestedList(_), Some(_)) => None,
        };

        match (value, self.transform) {
            (Some(value), Some(transform)) => Some(transform.apply(value)),
            (Some(value), None) => Some(value),
            (None, _) => self.default.clone(),
        }
    }
}

fn extract_item(element: ElementRef, fields: &[Field]) -> Map<String, Value> {
    let mut item = Map::new();
    for field in fields {
        if let Some(value) = field.extract(element) {
            item.insert(field.name.clone(), value);
        }
    }
    item
}

fn extract_single_values(element: ElementRef, fields: &[Field]) -> Map<String, Value> {
    let mut item = Map::new();
    for field in fields {
        if let Some(value) = field.single_value(element) {
            item.insert(field.name.clone(), value);
        }
    }
    item
}

/// Extracts one JSON object per element matching the schema's base selector.
#[derive(Debug)]
pub struct JsonCssExtractionStrategy {
    schema: CssSchema,
    base_selector: Selector,
    base_fields: Vec<Field>,
    fields: Vec<Field>,
}

impl JsonCssExtractionStrategy {
    pub fn new(schema: Value) -> Result<Self> {
        let schema: CssSchema =
            serde_json::from_value(schema).context("Malformed CSS extraction schema")?;
        Self::from_schema(schema)
    }

    pub fn from_schema(schema: CssSchema) -> Result<Self> {
        let base_selector = parse_selector(&schema.base_selector)?;
        let base_fields = compile_fields(&schema.base_fields)?;
        let fields = compile_fields(&schema.fields)?;
        Ok(Self {
            schema,
            base_selector,
            base_fields,
            fields,
        })
    }

    pub fn schema(&self) -> &CssSchema {
        &self.schema
    }

    pub fn extract_html(&self, page: &str) -> Value {
        let document = Html::parse_document(page);
        let mut items = Vec::new();
        for element in document.select(&self.base_selector) {
            let mut item = extract_single_values(element, &self.base_fields);
            item.extend(extract_item(element, &self.fields));
            if !item.is_empty() {
                items.push(Value::Object(item));
            }
        }
        Value::Array(items)
    }
}

#[async_trait]
impl ExtractionStrategy for JsonCssExtractionStrategy {
    async fn extract(&self, page: &str, location: &PageLocation) -> Result<Value> {
        let items = self.extract_html(page);
        if let Value::Array(found) = &items {
            log::debug!(
                "Extracted {} {} item(s) from {location}",
                found.len(),
                self.schema.name.as_deref().unwrap_or("unnamed")
            );
        }
        Ok(items)
    }
}
