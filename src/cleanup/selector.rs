//! Label and field selectors for cleanup stages.
//!
//! Selectors are values built once and passed into the cleaner. They render
//! to the Kubernetes selector syntax for list calls and can also be matched
//! locally, which in-memory backends rely on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Label that opts an object out of cleanup when set to `true`.
pub const NO_CLEANUP_LABEL: &str = "shoot.gardener.cloud/no-cleanup";
/// Label carrying the role of a gardener-managed object.
pub const ROLE_LABEL: &str = "gardener.cloud/role";
/// Role of objects deployed by gardener itself.
pub const ROLE_SYSTEM_COMPONENT: &str = "system-component";

/// Namespaces that are never deleted.
pub const PROTECTED_NAMESPACES: [&str; 4] =
    ["default", "kube-system", "kube-public", "kube-node-lease"];

const MAX_NAME_LENGTH: usize = 63;
const MAX_PREFIX_LENGTH: usize = 253;

fn is_valid_name(name: &str) -> bool {
    static NAME_RE: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").ok()
    });
    name.len() <= MAX_NAME_LENGTH && NAME_RE.as_ref().is_some_and(|re| re.is_match(name))
}

fn is_valid_prefix(prefix: &str) -> bool {
    static PREFIX_RE: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .ok()
    });
    prefix.len() <= MAX_PREFIX_LENGTH && PREFIX_RE.as_ref().is_some_and(|re| re.is_match(prefix))
}

/// Validate a label key of the form `[prefix/]name`.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = match key.split_once('/') {
        Some((prefix, name)) => is_valid_prefix(prefix) && is_valid_name(name),
        None => is_valid_name(key),
    };
    if !valid {
        return Err(Error::InvalidSelector(format!("invalid label key {key:?}")));
    }
    Ok(())
}

/// Validate a label value; empty values are allowed.
pub fn validate_value(value: &str) -> Result<()> {
    if !value.is_empty() && !is_valid_name(value) {
        return Err(Error::InvalidSelector(format!("invalid label value {value:?}")));
    }
    Ok(())
}

/// Operator of a label requirement.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Equals,
    NotEquals,
}

/// A single condition on the labels of an object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    /// Build a requirement, validating key, values and their number.
    pub fn new(key: &str, operator: Operator, values: &[&str]) -> Result<Self> {
        validate_key(key)?;
        let expected = match operator {
            Operator::Exists | Operator::DoesNotExist => values.is_empty(),
            Operator::Equals | Operator::NotEquals => values.len() == 1,
            Operator::In | Operator::NotIn => !values.is_empty(),
        };
        if !expected {
            return Err(Error::InvalidSelector(format!(
                "operator {operator:?} on {key:?} does not accept {} value(s)",
                values.len()
            )));
        }
        for value in values {
            validate_value(value)?;
        }

        let mut values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        values.sort();
        values.dedup();
        Ok(Self {
            key: key.to_string(),
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Whether `labels` satisfy the requirement.
    ///
    /// Negative operators also match objects without the key.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        let contains = |v: &String| self.values.contains(v);
        match self.operator {
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::In | Operator::Equals => value.is_some_and(contains),
            Operator::NotIn | Operator::NotEquals => !value.is_some_and(contains),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.join(",");
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::Equals => write!(f, "{}={}", self.key, values),
            Operator::NotEquals => write!(f, "{}!={}", self.key, values),
            Operator::In => write!(f, "{} in ({})", self.key, values),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, values),
        }
    }
}

/// Conjunction of label requirements; empty selects everything.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Selector matching every object
    pub fn everything() -> Self {
        Self::default()
    }

    /// Add a requirement
    pub fn with(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Add all requirements of another selector
    pub fn and(mut self, other: &LabelSelector) -> Self {
        self.requirements.extend(other.requirements.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(","))
    }
}

/// Selector excluding objects opted out of cleanup and gardener's own
/// system components.
pub fn cleanup_selector() -> Result<LabelSelector> {
    Ok(LabelSelector::everything()
        .with(Requirement::new(NO_CLEANUP_LABEL, Operator::NotEquals, &["true"])?)
        .with(Requirement::new(
            ROLE_LABEL,
            Operator::NotEquals,
            &[ROLE_SYSTEM_COMPONENT],
        )?))
}

/// Object field a field selector can refer to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    Name,
    Namespace,
}

impl Field {
    fn path(self) -> &'static str {
        match self {
            Field::Name => "metadata.name",
            Field::Namespace => "metadata.namespace",
        }
    }
}

/// Conjunction of equality and inequality conditions on object fields.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldSelector {
    terms: Vec<(Field, bool, String)>,
}

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`
    pub fn equals(mut self, field: Field, value: &str) -> Self {
        self.terms.push((field, true, value.to_string()));
        self
    }

    /// Require `field` to differ from `value`
    pub fn not_equals(mut self, field: Field, value: &str) -> Self {
        self.terms.push((field, false, value.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether an object with the given name and namespace is selected.
    pub fn matches(&self, name: &str, namespace: Option<&str>) -> bool {
        self.terms.iter().all(|(field, equal, value)| {
            let actual = match field {
                Field::Name => name,
                Field::Namespace => namespace.unwrap_or_default(),
            };
            (actual == value) == *equal
        })
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .terms
            .iter()
            .map(|(field, equal, value)| {
                let op = if *equal { "=" } else { "!=" };
                format!("{}{op}{value}", field.path())
            })
            .collect();
        write!(f, "{}", rendered.join(","))
    }
}

/// Field selector excluding the protected namespaces.
pub fn unprotected_namespaces() -> FieldSelector {
    PROTECTED_NAMESPACES
        .iter()
        .fold(FieldSelector::everything(), |selector, name| {
            selector.not_equals(Field::Name, name)
        })
}

/// Label and field selector of a cleanup stage.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Selector {
    pub labels: LabelSelector,
    pub fields: FieldSelector,
}

impl Selector {
    /// Selector matching every object
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn labels(labels: LabelSelector) -> Self {
        Self {
            labels,
            fields: FieldSelector::everything(),
        }
    }

    pub fn with_fields(mut self, fields: FieldSelector) -> Self {
        self.fields = fields;
        self
    }

    pub fn matches(
        &self,
        name: &str,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> bool {
        self.labels.matches(labels) && self.fields.matches(name, namespace)
    }
}
