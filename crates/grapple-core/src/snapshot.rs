//! Observable element state, captured before and after an action.

use crate::driver::{Driver, DriverResult, ElementRef};
use serde::Deserialize;
use std::fmt;

/// Which observable property of an element proves an effect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    /// Selected state of a checkbox, radio button or option.
    Checked,
    Displayed,
    /// Visible text.
    Text,
    /// Live `value` property of a form control.
    Value,
    /// Markup attribute.
    Attribute(String),
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Checked => f.write_str("checked"),
            Property::Displayed => f.write_str("displayed"),
            Property::Text => f.write_str("text"),
            Property::Value => f.write_str("value"),
            Property::Attribute(name) => write!(f, "@{}", name),
        }
    }
}

/// A captured property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateValue {
    Flag(bool),
    Text(String),
    Absent,
}

impl StateValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            StateValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Flag(b) => write!(f, "{}", b),
            StateValue::Text(s) => write!(f, "{:?}", s),
            StateValue::Absent => f.write_str("<absent>"),
        }
    }
}

/// One reading of one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub property: Property,
    pub value: StateValue,
}

impl Snapshot {
    pub fn capture<D: Driver + ?Sized>(
        driver: &mut D,
        el: &ElementRef,
        property: &Property,
    ) -> DriverResult<Self> {
        let value = match property {
            Property::Checked => StateValue::Flag(driver.is_selected(el)?),
            Property::Displayed => StateValue::Flag(driver.is_displayed(el)?),
            Property::Text => StateValue::Text(driver.text(el)?.trim().to_string()),
            Property::Value => driver
                .property(el, "value")?
                .map(StateValue::Text)
                .unwrap_or(StateValue::Absent),
            Property::Attribute(name) => driver
                .attribute(el, name)?
                .map(StateValue::Text)
                .unwrap_or(StateValue::Absent),
        };
        Ok(Self {
            property: property.clone(),
            value,
        })
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.property, self.value)
    }
}

/// The direction a verified action must move a property in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Boolean inverted.
    Flip,
    BecomeTrue,
    BecomeFalse,
    /// Any difference.
    Changed,
    /// Changed, and now equal to this text.
    Equals(String),
    /// Changed, and now containing this text.
    Contains(String),
}

impl Expectation {
    pub fn is_met(&self, before: &StateValue, after: &StateValue) -> bool {
        match self {
            Expectation::Flip => match (before.as_flag(), after.as_flag()) {
                (Some(b), Some(a)) => a != b,
                _ => false,
            },
            Expectation::BecomeTrue => before.as_flag() == Some(false) && after.as_flag() == Some(true),
            Expectation::BecomeFalse => before.as_flag() == Some(true) && after.as_flag() == Some(false),
            Expectation::Changed => before != after,
            Expectation::Equals(want) => before != after && after.as_text() == Some(want.as_str()),
            Expectation::Contains(want) => {
                before != after && after.as_text().is_some_and(|t| t.contains(want.as_str()))
            }
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Flip => f.write_str("flip"),
            Expectation::BecomeTrue => f.write_str("become true"),
            Expectation::BecomeFalse => f.write_str("become false"),
            Expectation::Changed => f.write_str("change"),
            Expectation::Equals(s) => write!(f, "equal {:?}", s),
            Expectation::Contains(s) => write!(f, "contain {:?}", s),
        }
    }
}
