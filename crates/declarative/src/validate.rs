//! Required/allowed property rules for polymorphic entities
//!
//! Device types and storage backends accept different property subsets.
//! Rules are checked against the desired set before anything is sent to the
//! daemon, so a rejected entity costs zero gateway calls.

use crate::error::{Error, Result};
use crate::property::PropertySet;

/// Rules for one subtype tag (e.g. `disk`, `ceph`)
#[derive(Debug, Clone, Copy)]
pub struct RuleSet {
    pub tag: &'static str,
    /// Must be explicitly set to a non-nil value
    pub required: &'static [&'static str],
    /// Everything that may be set for this tag
    pub allowed: &'static [&'static str],
}

impl RuleSet {
    pub const fn new(
        tag: &'static str,
        required: &'static [&'static str],
        allowed: &'static [&'static str],
    ) -> Self {
        Self {
            tag,
            required,
            allowed,
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        self.allowed.contains(&name)
    }
}

/// Find the rules for a tag
pub fn rules_for<'r>(rules: &'r [RuleSet], tag: &str) -> Option<&'r RuleSet> {
    rules.iter().find(|r| r.tag == tag)
}

/// Check a desired property set against the rules for `tag`
pub fn validate(entity: &str, tag: &str, rules: &[RuleSet], desired: &PropertySet) -> Result<()> {
    let rule = rules_for(rules, tag)
        .ok_or_else(|| Error::validation(entity, format!("unsupported type '{}'", tag)))?;

    if let Some(missing) = rule.required.iter().find(|name| desired.get(name).is_none()) {
        return Err(Error::validation(
            entity,
            format!("'{}' is required for {}", missing, tag),
        ));
    }

    if let Some(extra) = desired
        .names()
        .find(|name| desired.get(name).is_some() && !rule.allows(name))
    {
        return Err(Error::validation(
            entity,
            format!("'{}' is not allowed for {}", extra, tag),
        ));
    }

    Ok(())
}
