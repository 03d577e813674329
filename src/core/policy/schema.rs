use serde_json::Value;

/// Validates a policy document before the engine accepts it.
///
/// Implementations must be pure: no network, no filesystem. The default
/// is bundled with the crate; embedders can supply their own when the
/// rule vocabulary grows.
pub trait PolicyValidator {
    fn validate(&self, doc: &Value) -> Result<(), String>;
}

/// Bundled structural schema for policy documents: a JSON object mapping
/// identifiers to rules, each rule carrying only optional `conflicts` /
/// `sub_mods` arrays of strings.
#[derive(Debug, Default)]
pub struct DefaultPolicySchema;

impl PolicyValidator for DefaultPolicySchema {
    fn validate(&self, doc: &Value) -> Result<(), String> {
        let Some(rules) = doc.as_object() else {
            return Err("policy document must be a JSON object".to_string());
        };

        for (key, rule) in rules {
            let Some(fields) = rule.as_object() else {
                return Err(format!("rule for '{key}' must be an object"));
            };

            for (field, value) in fields {
                match field.as_str() {
                    "conflicts" | "sub_mods" => {
                        let Some(items) = value.as_array() else {
                            return Err(format!("'{key}.{field}' must be an array"));
                        };
                        if items.iter().any(|item| !item.is_string()) {
                            return Err(format!("'{key}.{field}' must contain only strings"));
                        }
                    }
                    other => {
                        return Err(format!("unknown field '{other}' in rule for '{key}'"));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_rules() {
        let doc = json!({
            "sodium": { "conflicts": ["optifine"], "sub_mods": ["lithium"] },
            "iris": { "conflicts": [] },
            "empty": {}
        });
        assert!(DefaultPolicySchema.validate(&doc).is_ok());
    }

    #[test]
    fn rejects_non_object_document() {
        assert!(DefaultPolicySchema.validate(&json!(["sodium"])).is_err());
    }

    #[test]
    fn rejects_unknown_rule_field() {
        let doc = json!({ "sodium": { "requires": ["lithium"] } });
        let err = DefaultPolicySchema.validate(&doc).unwrap_err();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn rejects_non_string_entries() {
        let doc = json!({ "sodium": { "conflicts": [1, 2] } });
        assert!(DefaultPolicySchema.validate(&doc).is_err());
    }
}
