//! Searchable entity declarations.

use std::sync::Arc;

/// Related record eager-loaded next to each match (a `LEFT JOIN`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainSpec {
    /// Key the related record is nested under in each result row.
    pub name: String,
    pub table: String,
    /// Column on the searched table pointing at `table.id`.
    pub foreign_key: String,
    pub columns: Vec<String>,
}

impl ContainSpec {
    pub fn new(name: &str, table: &str, foreign_key: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            foreign_key: foreign_key.to_string(),
            columns: columns.iter().map(|column| column.to_string()).collect(),
        }
    }
}

/// Fields eligible for free-text matching on one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickFilterSpec {
    pub fields: Vec<String>,
    pub contain: Vec<ContainSpec>,
    /// Column to order matches by; primary key order when `None`.
    pub order_by: Option<String>,
}

impl QuickFilterSpec {
    pub fn fields(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|field| field.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_contain(mut self, contain: ContainSpec) -> Self {
        self.contain.push(contain);
        self
    }

    pub fn ordered_by(mut self, column: &str) -> Self {
        self.order_by = Some(column.to_string());
        self
    }

    pub fn is_searchable(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Collaborator owning one searchable entity.
pub trait SearchableEntity: Send + Sync {
    fn entity_name(&self) -> &str;
    fn table_name(&self) -> &str;
    fn quick_filter_spec(&self) -> QuickFilterSpec;
}

/// Table-backed entity with a static declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntity {
    name: String,
    table: String,
    spec: QuickFilterSpec,
}

impl TableEntity {
    pub fn new(name: &str, table: &str, spec: QuickFilterSpec) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            spec,
        }
    }
}

impl SearchableEntity for TableEntity {
    fn entity_name(&self) -> &str {
        &self.name
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn quick_filter_spec(&self) -> QuickFilterSpec {
        self.spec.clone()
    }
}

fn organisation_contain() -> ContainSpec {
    ContainSpec::new(
        "organisation",
        "organisations",
        "organisation_id",
        &["id", "name"],
    )
}

/// Built-in declaration for one of the directory entities, by name.
pub fn builtin_entity(name: &str) -> Option<Arc<dyn SearchableEntity>> {
    let entity = match name {
        "Broods" => TableEntity::new(
            "Broods",
            "broods",
            QuickFilterSpec::fields(&["name", "url", "description"])
                .with_contain(organisation_contain()),
        ),
        "Individuals" => TableEntity::new(
            "Individuals",
            "individuals",
            QuickFilterSpec::fields(&["email", "first_name", "last_name", "position"]),
        ),
        "Organisations" => TableEntity::new(
            "Organisations",
            "organisations",
            QuickFilterSpec::fields(&["name", "uuid", "nationality", "sector", "type", "url"]),
        ),
        "SharingGroups" => TableEntity::new(
            "SharingGroups",
            "sharing_groups",
            QuickFilterSpec::fields(&["name", "releasability", "description"])
                .with_contain(organisation_contain()),
        ),
        "Users" => TableEntity::new(
            "Users",
            "users",
            QuickFilterSpec::fields(&["username"])
                .with_contain(ContainSpec::new(
                    "individual",
                    "individuals",
                    "individual_id",
                    &["id", "email", "first_name", "last_name"],
                ))
                .with_contain(organisation_contain()),
        ),
        // Key material is not free-text searchable.
        "EncryptionKeys" => TableEntity::new(
            "EncryptionKeys",
            "encryption_keys",
            QuickFilterSpec::default(),
        ),
        _ => return None,
    };
    Some(Arc::new(entity))
}

#[cfg(test)]
mod tests {
    use super::{builtin_entity, QuickFilterSpec};

    #[test]
    fn builtin_entities_resolve_by_name() {
        let users = builtin_entity("Users").expect("Users is built in");
        assert_eq!(users.table_name(), "users");
        assert_eq!(users.quick_filter_spec().contain.len(), 2);
        assert!(builtin_entity("Alignments").is_none());
    }

    #[test]
    fn encryption_keys_are_not_searchable() {
        let keys = builtin_entity("EncryptionKeys").expect("EncryptionKeys is built in");
        assert!(!keys.quick_filter_spec().is_searchable());
        assert!(QuickFilterSpec::fields(&["name"]).is_searchable());
    }
}
