//! Minimal JSON Patch construction for the ndots DNS option
//!
//! Given the Pod's current DNS options, produce the single smallest operation
//! that converges the Pod to the desired ndots value, or nothing when it is
//! already there.

use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::NDOTS_OPTION;

/// One entry of a Pod's `spec.dnsConfig.options`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsOption {
    /// Resolver option name
    pub name: String,
    /// Optional option value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl DnsOption {
    /// Create an option with a value
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// Builds the ndots patch for a fixed desired value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBuilder {
    desired: String,
}

impl PatchBuilder {
    /// Create a builder converging to `desired`
    pub fn new(desired: impl Into<String>) -> Self {
        Self {
            desired: desired.into(),
        }
    }

    /// Build the patch for the Pod's current DNS state
    ///
    /// `existing` is `None` when the Pod has no `dnsConfig` at all. A
    /// `dnsConfig` without options (or with an empty list) is `Some(&[])`.
    ///
    /// The first option named `ndots` is the one inspected and replaced;
    /// later duplicates are left alone. An `ndots` entry without a value gets
    /// the value added, since `replace` requires the target member to exist.
    pub fn build(&self, existing: Option<&[DnsOption]>) -> Option<PatchOperation> {
        let Some(options) = existing else {
            return Some(add(
                ["spec", "dnsConfig"],
                json!({ "options": [self.ndots_option()] }),
            ));
        };

        if options.is_empty() {
            return Some(add(
                ["spec", "dnsConfig", "options"],
                json!([self.ndots_option()]),
            ));
        }

        let Some(index) = options.iter().position(|o| o.name == NDOTS_OPTION) else {
            return Some(add(
                ["spec", "dnsConfig", "options", "-"],
                self.ndots_option(),
            ));
        };

        let current = options[index].value.as_deref();
        if current == Some(self.desired.as_str()) {
            return None;
        }

        let index = index.to_string();
        let path = PointerBuf::from_tokens(["spec", "dnsConfig", "options", index.as_str(), "value"]);
        let value = Value::String(self.desired.clone());
        Some(match current {
            Some(_) => PatchOperation::Replace(ReplaceOperation { path, value }),
            // RFC 6902 4.3: replace fails on a missing member, add creates it
            None => PatchOperation::Add(AddOperation { path, value }),
        })
    }

    fn ndots_option(&self) -> Value {
        json!({ "name": NDOTS_OPTION, "value": self.desired })
    }
}

fn add<'t, const N: usize>(tokens: [&'t str; N], value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(tokens),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_json(op: &PatchOperation) -> Value {
        serde_json::to_value(op).unwrap()
    }

    fn options(entries: &[(&str, Option<&str>)]) -> Vec<DnsOption> {
        entries
            .iter()
            .map(|(name, value)| DnsOption {
                name: name.to_string(),
                value: value.map(str::to_string),
            })
            .collect()
    }

    /// Apply the builder's output to a Pod document and read back its options
    fn apply(pod: &mut Value, op: PatchOperation) -> Option<Vec<DnsOption>> {
        json_patch::patch(pod, &[op]).unwrap();
        dns_options(pod)
    }

    fn dns_options(pod: &Value) -> Option<Vec<DnsOption>> {
        let dns = pod.pointer("/spec/dnsConfig")?;
        Some(
            dns.get("options")
                .map(|o| serde_json::from_value(o.clone()).unwrap())
                .unwrap_or_default(),
        )
    }

    // =========================================================================
    // Unit Tests
    // =========================================================================

    #[test]
    fn test_no_dns_config_adds_whole_object() {
        let op = PatchBuilder::new("2").build(None).unwrap();
        assert_eq!(
            to_json(&op),
            json!({
                "op": "add",
                "path": "/spec/dnsConfig",
                "value": {"options": [{"name": "ndots", "value": "2"}]}
            })
        );
    }

    #[test]
    fn test_no_options_adds_options_list() {
        let op = PatchBuilder::new("3").build(Some(&[])).unwrap();
        assert_eq!(
            to_json(&op),
            json!({
                "op": "add",
                "path": "/spec/dnsConfig/options",
                "value": [{"name": "ndots", "value": "3"}]
            })
        );
    }

    #[test]
    fn test_missing_ndots_is_appended() {
        let existing = options(&[("timeout", Some("1")), ("single-request", None)]);
        let op = PatchBuilder::new("2").build(Some(&existing)).unwrap();
        assert_eq!(
            to_json(&op),
            json!({
                "op": "add",
                "path": "/spec/dnsConfig/options/-",
                "value": {"name": "ndots", "value": "2"}
            })
        );
    }

    #[test]
    fn test_matching_ndots_needs_no_patch() {
        let existing = options(&[("ndots", Some("2"))]);
        assert!(PatchBuilder::new("2").build(Some(&existing)).is_none());
    }

    #[test]
    fn test_different_ndots_is_replaced_in_place() {
        let existing = options(&[("timeout", Some("1")), ("ndots", Some("5"))]);
        let op = PatchBuilder::new("2").build(Some(&existing)).unwrap();
        assert_eq!(
            to_json(&op),
            json!({"op": "replace", "path": "/spec/dnsConfig/options/1/value", "value": "2"})
        );
    }

    #[test]
    fn test_valueless_ndots_gets_value_added() {
        let existing = options(&[("ndots", None)]);
        let op = PatchBuilder::new("2").build(Some(&existing)).unwrap();
        assert_eq!(
            to_json(&op),
            json!({"op": "add", "path": "/spec/dnsConfig/options/0/value", "value": "2"})
        );
    }

    #[test]
    fn test_first_duplicate_wins() {
        let existing = options(&[("ndots", Some("5")), ("ndots", Some("2"))]);
        let op = PatchBuilder::new("2").build(Some(&existing)).unwrap();
        assert_eq!(
            to_json(&op)["path"],
            json!("/spec/dnsConfig/options/0/value")
        );

        let existing = options(&[("ndots", Some("2")), ("ndots", Some("5"))]);
        assert!(PatchBuilder::new("2").build(Some(&existing)).is_none());
    }

    #[test]
    fn test_dns_option_omits_missing_value() {
        let opt = DnsOption {
            name: "single-request".to_string(),
            value: None,
        };
        assert_eq!(serde_json::to_value(&opt).unwrap(), json!({"name": "single-request"}));
    }

    // =========================================================================
    // Story Tests
    // =========================================================================

    /// Story: applying a patch and rebuilding against the result yields nothing
    #[test]
    fn story_patches_are_idempotent() {
        let builder = PatchBuilder::new("2");
        let pods = [
            json!({"spec": {"containers": []}}),
            json!({"spec": {"dnsConfig": {}}}),
            json!({"spec": {"dnsConfig": {"nameservers": ["1.1.1.1"]}}}),
            json!({"spec": {"dnsConfig": {"options": []}}}),
            json!({"spec": {"dnsConfig": {"options": [{"name": "timeout", "value": "1"}]}}}),
            json!({"spec": {"dnsConfig": {"options": [{"name": "ndots", "value": "5"}]}}}),
            json!({"spec": {"dnsConfig": {"options": [{"name": "edns0"}, {"name": "ndots"}]}}}),
        ];

        for mut pod in pods {
            let before = pod.clone();
            let op = builder
                .build(dns_options(&pod).as_deref())
                .unwrap_or_else(|| panic!("expected a patch for {before}"));
            let after = apply(&mut pod, op);
            assert!(
                builder.build(after.as_deref()).is_none(),
                "second pass should be a no-op for {before}"
            );
        }
    }

    /// Story: existing options other than ndots survive the patch untouched
    #[test]
    fn story_unrelated_options_are_preserved() {
        let mut pod = json!({"spec": {"dnsConfig": {"options": [
            {"name": "timeout", "value": "1"},
            {"name": "ndots", "value": "5"},
            {"name": "attempts", "value": "3"}
        ]}}});
        let op = PatchBuilder::new("1")
            .build(dns_options(&pod).as_deref())
            .unwrap();
        let after = apply(&mut pod, op).unwrap();
        assert_eq!(
            after,
            options(&[("timeout", Some("1")), ("ndots", Some("1")), ("attempts", Some("3"))])
        );
    }
}
