use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::verification::DynamicField;

/// Admin-managed schema for the extra fields shown on verification records
/// and forms. Maintained outside this service; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldDefinition {
    pub id: Uuid,
    pub field_name: String,
    pub field_label: String,
    pub field_type: String, // "text", "number", "date", ...
    pub placeholder: Option<String>,
    pub required: bool,
    pub default_value: Option<String>,
    pub display_order: i64,
    pub applies_to: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Projects a record's stored dynamic-field list onto the active definitions:
/// one entry per definition, in display order, preferring a stored value
/// matched by label or field name, then the definition default, then "".
///
/// Applied on every listing so definitions added after a record was created
/// still appear on it.
pub fn resolve_dynamic_fields(
    definitions: &[CustomFieldDefinition],
    stored: &[DynamicField],
) -> Vec<DynamicField> {
    definitions
        .iter()
        .map(|def| {
            let value = stored
                .iter()
                .find(|f| {
                    f.label.eq_ignore_ascii_case(&def.field_label)
                        || f.label.eq_ignore_ascii_case(&def.field_name)
                })
                .map(|f| f.value.clone())
                .or_else(|| def.default_value.clone())
                .unwrap_or_default();
            DynamicField { label: def.field_label.clone(), value }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, label: &str, default: Option<&str>, order: i64) -> CustomFieldDefinition {
        CustomFieldDefinition {
            id: Uuid::new_v4(),
            field_name: name.into(),
            field_label: label.into(),
            field_type: "text".into(),
            placeholder: None,
            required: false,
            default_value: default.map(String::from),
            display_order: order,
            applies_to: "verification".into(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn resolution_covers_every_definition_in_order() {
        let defs = vec![
            definition("employee_id", "Employee ID", None, 1),
            definition("branch", "Branch", Some("Head Office"), 2),
            definition("remarks", "Remarks", None, 3),
        ];
        let stored = vec![DynamicField { label: "Employee ID".into(), value: "E-77".into() }];

        let resolved = resolve_dynamic_fields(&defs, &stored);
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0], DynamicField { label: "Employee ID".into(), value: "E-77".into() });
        assert_eq!(resolved[1], DynamicField { label: "Branch".into(), value: "Head Office".into() });
        assert_eq!(resolved[2], DynamicField { label: "Remarks".into(), value: "".into() });
    }

    #[test]
    fn stored_value_matches_by_field_name_too() {
        let defs = vec![definition("branch", "Branch", None, 1)];
        let stored = vec![DynamicField { label: "branch".into(), value: "Pune".into() }];
        let resolved = resolve_dynamic_fields(&defs, &stored);
        assert_eq!(resolved[0].value, "Pune");
    }

    #[test]
    fn no_definitions_resolves_to_empty_list() {
        let stored = vec![DynamicField { label: "Orphan".into(), value: "kept in storage".into() }];
        assert!(resolve_dynamic_fields(&[], &stored).is_empty());
    }
}
