//! Declarative HTML forms: field specs, cleaning, change tracking and errors.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

use crate::models::format_db_datetime;

pub const NON_FIELD_ERRORS: &str = "__all__";

const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Submitted `application/x-www-form-urlencoded` key/value pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormData(HashMap<String, String>);

impl FormData {
    pub fn from_bytes(b: &[u8]) -> Self {
        url::form_urlencoded::parse(b).into_owned().collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for FormData {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        FormData(iter.into_iter().collect())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("This field is required.")]
    Required,
    #[error("Ensure this value has at most {0} characters.")]
    TooLong(usize),
    #[error("Enter a valid e-mail address.")]
    InvalidEmail,
    #[error("Enter a whole number.")]
    InvalidInteger,
    #[error("Enter a valid date/time.")]
    InvalidDateTime,
    #[error("Select a valid choice. That choice is not one of the available choices.")]
    InvalidChoice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text { max_length: usize },
    TextArea,
    Email { max_length: usize },
    Integer,
    DateTime,
    Boolean,
    Choice,
    /// A reference to `core_category`, offered as a choice of permitted categories.
    Category,
}

/// A statically declared field of a model form.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Empty,
    Text(String),
    Integer(i32),
    DateTime(NaiveDateTime),
    Boolean(bool),
}

impl Value {
    pub fn to_form_string(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::DateTime(dt) => format_db_datetime(dt),
            Value::Boolean(true) => "on".into(),
            Value::Boolean(false) => String::new(),
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    !matches!(raw.trim().to_lowercase().as_str(), "" | "0" | "off" | "false")
}

fn is_valid_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new<V: ToString, L: Into<String>>(value: V, label: L) -> Self {
        Self {
            value: value.to_string(),
            label: label.into(),
        }
    }
}

/// A field as offered on one form, carrying any per-request choices.
#[derive(Clone, Debug)]
pub struct FormField {
    pub name: &'static str,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub choices: Vec<Choice>,
}

impl From<&FieldSpec> for FormField {
    fn from(spec: &FieldSpec) -> Self {
        Self {
            name: spec.name,
            label: spec.label.into(),
            kind: spec.kind,
            required: spec.required,
            choices: vec![],
        }
    }
}

impl FormField {
    pub fn choice(name: &'static str, label: &str, required: bool, choices: Vec<Choice>) -> Self {
        Self {
            name,
            label: label.into(),
            kind: FieldKind::Choice,
            required,
            choices,
        }
    }

    pub fn widget(&self) -> &'static str {
        match self.kind {
            FieldKind::Text { .. } => "text",
            FieldKind::TextArea => "textarea",
            FieldKind::Email { .. } => "email",
            FieldKind::Integer => "number",
            FieldKind::DateTime => "datetime",
            FieldKind::Boolean => "checkbox",
            FieldKind::Choice | FieldKind::Category => "select",
        }
    }

    pub fn clean(&self, raw: Option<&str>) -> Result<Value, FieldError> {
        if self.kind == FieldKind::Boolean {
            let value = raw.map_or(false, is_truthy);
            if self.required && !value {
                return Err(FieldError::Required);
            }
            return Ok(Value::Boolean(value));
        }

        let raw = raw.map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return if self.required {
                Err(FieldError::Required)
            } else {
                Ok(Value::Empty)
            };
        }

        match self.kind {
            FieldKind::Text { max_length } => {
                if raw.chars().count() > max_length {
                    Err(FieldError::TooLong(max_length))
                } else {
                    Ok(Value::Text(raw.into()))
                }
            }
            FieldKind::TextArea => Ok(Value::Text(raw.into())),
            FieldKind::Email { max_length } => {
                if raw.chars().count() > max_length {
                    Err(FieldError::TooLong(max_length))
                } else if !is_valid_email(raw) {
                    Err(FieldError::InvalidEmail)
                } else {
                    Ok(Value::Text(raw.into()))
                }
            }
            FieldKind::Integer => raw
                .parse::<i32>()
                .map(Value::Integer)
                .map_err(|_| FieldError::InvalidInteger),
            FieldKind::DateTime => parse_datetime(raw)
                .map(Value::DateTime)
                .ok_or(FieldError::InvalidDateTime),
            FieldKind::Choice => {
                if self.choices.iter().any(|c| c.value == raw) {
                    Ok(Value::Text(raw.into()))
                } else {
                    Err(FieldError::InvalidChoice)
                }
            }
            FieldKind::Category => {
                let id = raw.parse::<i32>().map_err(|_| FieldError::InvalidChoice)?;
                if self.choices.iter().any(|c| c.value == raw) {
                    Ok(Value::Integer(id))
                } else {
                    Err(FieldError::InvalidChoice)
                }
            }
            FieldKind::Boolean => unreachable!("handled above"),
        }
    }

    fn has_changed(&self, initial: &str, raw: Option<&str>) -> bool {
        if self.kind == FieldKind::Boolean {
            return is_truthy(initial) != raw.map_or(false, is_truthy);
        }
        raw.map(str::trim).unwrap_or("") != initial.trim()
    }
}

#[derive(Clone, Debug, Default)]
pub struct CleanedData(BTreeMap<&'static str, Value>);

impl CleanedData {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i32> {
        match self.0.get(name) {
            Some(Value::Integer(i)) => Some(*i),
            Some(Value::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn datetime(&self, name: &str) -> Option<NaiveDateTime> {
        match self.0.get(name) {
            Some(Value::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(Value::Boolean(b)) => Some(*b),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldView {
    pub name: String,
    pub html_name: String,
    pub label: String,
    pub widget: &'static str,
    pub value: String,
    pub checked: bool,
    pub required: bool,
    pub choices: Vec<Choice>,
    pub errors: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FormView {
    pub fields: Vec<FieldView>,
    pub errors: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Form {
    prefix: Option<String>,
    fields: Vec<FormField>,
    initial: HashMap<String, String>,
    data: Option<FormData>,
    empty_permitted: bool,
    cleaned: CleanedData,
    errors: BTreeMap<String, Vec<String>>,
    changed: Vec<String>,
}

impl Form {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self {
            prefix: None,
            fields,
            initial: HashMap::new(),
            data: None,
            empty_permitted: false,
            cleaned: CleanedData::default(),
            errors: BTreeMap::new(),
            changed: vec![],
        }
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_initial(mut self, initial: HashMap<String, String>) -> Self {
        self.initial = initial;
        self
    }

    /// Unchanged forms skip validation entirely, as extra rows of a formset do.
    pub fn with_empty_permitted(mut self, empty_permitted: bool) -> Self {
        self.empty_permitted = empty_permitted;
        self
    }

    /// Attaches submitted data and validates it.
    pub fn bind(mut self, data: FormData) -> Self {
        self.data = Some(data);
        self.full_clean();
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn html_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}-{}", prefix, name),
            None => name.to_string(),
        }
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn remove_field(&mut self, name: &str) {
        self.fields.retain(|f| f.name != name);
    }

    pub fn is_bound(&self) -> bool {
        self.data.is_some()
    }

    /// Raw submitted value for one of this form's keys, prefix applied.
    pub fn raw_value(&self, name: &str) -> Option<&str> {
        let key = self.html_name(name);
        self.data.as_ref().and_then(|d| d.get(&key))
    }

    fn full_clean(&mut self) {
        self.errors.clear();
        self.changed.clear();
        self.cleaned = CleanedData::default();

        let data = match &self.data {
            Some(data) => data,
            None => return,
        };

        let mut changed = vec![];
        let mut cleaned = BTreeMap::new();
        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for field in &self.fields {
            let key = match &self.prefix {
                Some(prefix) => format!("{}-{}", prefix, field.name),
                None => field.name.to_string(),
            };
            let raw = data.get(&key);
            let initial = self.initial.get(field.name).map(|s| s.as_str()).unwrap_or("");
            if field.has_changed(initial, raw) {
                changed.push(field.name.to_string());
            }
            match field.clean(raw) {
                Ok(value) => {
                    cleaned.insert(field.name, value);
                }
                Err(e) => errors.entry(field.name.to_string()).or_default().push(e.to_string()),
            }
        }

        self.changed = changed;
        if self.empty_permitted && self.changed.is_empty() {
            return;
        }
        self.cleaned = CleanedData(cleaned);
        self.errors = errors;
    }

    pub fn is_valid(&self) -> bool {
        self.is_bound() && self.errors.is_empty()
    }

    pub fn has_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn changed_data(&self) -> &[String] {
        &self.changed
    }

    pub fn cleaned_data(&self) -> &CleanedData {
        &self.cleaned
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    pub fn add_error(&mut self, field: Option<&str>, message: &str) {
        let key = field.unwrap_or(NON_FIELD_ERRORS).to_string();
        self.errors.entry(key).or_default().push(message.into());
    }

    /// Replaces whatever errors `field` had with a single message.
    pub fn set_field_error(&mut self, field: &str, message: &str) {
        self.errors.insert(field.to_string(), vec![message.into()]);
    }

    pub fn non_field_errors(&self) -> Vec<String> {
        self.errors.get(NON_FIELD_ERRORS).cloned().unwrap_or_default()
    }

    pub fn view(&self) -> FormView {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                let value = if self.is_bound() {
                    self.raw_value(field.name).unwrap_or("").to_string()
                } else {
                    self.initial.get(field.name).cloned().unwrap_or_default()
                };
                FieldView {
                    name: field.name.to_string(),
                    html_name: self.html_name(field.name),
                    label: field.label.clone(),
                    widget: field.widget(),
                    checked: field.kind == FieldKind::Boolean && is_truthy(&value),
                    value,
                    required: field.required,
                    choices: field.choices.clone(),
                    errors: self.errors.get(field.name).cloned().unwrap_or_default(),
                }
            })
            .collect();
        FormView {
            fields,
            errors: self.non_field_errors(),
        }
    }
}
