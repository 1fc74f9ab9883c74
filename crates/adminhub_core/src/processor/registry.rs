//! Startup-time (scope, action) -> processor registration table.

use crate::processor::RequestProcessor;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Processor resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    NotFound { scope: String, action: String },
    Disabled { scope: String, action: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { scope, action } => {
                write!(f, "no processor registered for {scope}/{action}")
            }
            Self::Disabled { scope, action } => {
                write!(f, "processor for {scope}/{action} is disabled")
            }
        }
    }
}

impl Error for RegistryError {}

/// Listing row for one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorDescriptor {
    pub enabled: bool,
    pub scope: String,
    pub action: String,
}

struct Registration {
    processor: Arc<dyn RequestProcessor>,
    enabled: bool,
}

/// In-process processor registry.
///
/// Keys are kept in a `BTreeMap`, so listings come out sorted by scope and
/// then action without extra work.
#[derive(Default)]
pub struct ProcessorRegistry {
    entries: BTreeMap<(String, String), Registration>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enabled processor, replacing any previous one.
    pub fn register(
        &mut self,
        scope: &str,
        action: &str,
        processor: Arc<dyn RequestProcessor>,
    ) {
        self.register_with_state(scope, action, processor, true);
    }

    /// Registers a processor with an explicit enabled flag (last write wins).
    pub fn register_with_state(
        &mut self,
        scope: &str,
        action: &str,
        processor: Arc<dyn RequestProcessor>,
        enabled: bool,
    ) {
        self.entries.insert(
            (scope.trim().to_string(), action.trim().to_string()),
            Registration { processor, enabled },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves the processor for one (scope, action) pair.
    pub fn resolve(
        &self,
        scope: &str,
        action: &str,
    ) -> Result<Arc<dyn RequestProcessor>, RegistryError> {
        let key = (scope.trim().to_string(), action.trim().to_string());
        match self.entries.get(&key) {
            None => Err(RegistryError::NotFound {
                scope: key.0,
                action: key.1,
            }),
            Some(registration) if !registration.enabled => Err(RegistryError::Disabled {
                scope: key.0,
                action: key.1,
            }),
            Some(registration) => Ok(Arc::clone(&registration.processor)),
        }
    }

    /// Registrations grouped by scope; both levels sorted lexicographically.
    pub fn list(&self) -> BTreeMap<String, Vec<ProcessorDescriptor>> {
        let mut grouped: BTreeMap<String, Vec<ProcessorDescriptor>> = BTreeMap::new();
        for descriptor in self.descriptors() {
            grouped
                .entry(descriptor.scope.clone())
                .or_default()
                .push(descriptor);
        }
        grouped
    }

    /// Flat `{enabled, scope, action}` rows sorted by scope then action.
    pub fn descriptors(&self) -> Vec<ProcessorDescriptor> {
        self.entries
            .iter()
            .map(|((scope, action), registration)| ProcessorDescriptor {
                enabled: registration.enabled,
                scope: scope.clone(),
                action: action.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ProcessorRegistry, RegistryError};
    use crate::model::inbox::InboxEntry;
    use crate::processor::{
        ApplyOutcome, ProcessorResult, RenderedView, RequestProcessor, ValidatedChange,
    };
    use rusqlite::{Connection, Transaction};
    use serde_json::Value;
    use std::sync::Arc;

    struct NoopProcessor;

    impl RequestProcessor for NoopProcessor {
        fn validate(
            &self,
            _conn: &Connection,
            _entry: &InboxEntry,
        ) -> ProcessorResult<ValidatedChange> {
            Ok(ValidatedChange::default())
        }

        fn render(&self, _conn: &Connection, entry: &InboxEntry) -> ProcessorResult<RenderedView> {
            Ok(RenderedView {
                entry_id: entry.id,
                scope: entry.scope.clone(),
                action: entry.action.clone(),
                title: entry.title.clone(),
                summary: String::new(),
                changes: vec![],
                violations: vec![],
            })
        }

        fn apply_change(
            &self,
            _tx: &Transaction<'_>,
            entry: &InboxEntry,
            _change: &ValidatedChange,
        ) -> ProcessorResult<ApplyOutcome> {
            Ok(ApplyOutcome {
                entry_id: entry.id,
                message: String::new(),
                data: Value::Null,
            })
        }
    }

    fn same(left: &Arc<dyn RequestProcessor>, right: &Arc<dyn RequestProcessor>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(left) as *const (),
            Arc::as_ptr(right) as *const (),
        )
    }

    #[test]
    fn resolve_returns_last_registered_processor() {
        let mut registry = ProcessorRegistry::new();
        let first: Arc<dyn RequestProcessor> = Arc::new(NoopProcessor);
        let second: Arc<dyn RequestProcessor> = Arc::new(NoopProcessor);
        registry.register("users", "edit", Arc::clone(&first));
        registry.register("users", "edit", Arc::clone(&second));

        assert_eq!(registry.len(), 1);
        let resolved = registry.resolve("users", "edit").expect("registered pair");
        assert!(same(&resolved, &second));
        assert!(!same(&resolved, &first));
    }

    #[test]
    fn resolve_unknown_pair_is_not_found() {
        let mut registry = ProcessorRegistry::new();
        registry.register("users", "edit", Arc::new(NoopProcessor));

        let err = registry.resolve("users", "delete").err().expect("unknown pair");
        assert_eq!(
            err,
            RegistryError::NotFound {
                scope: "users".to_string(),
                action: "delete".to_string(),
            }
        );
    }

    #[test]
    fn resolve_disabled_pair_is_rejected_until_reenabled() {
        let mut registry = ProcessorRegistry::new();
        registry.register_with_state(
            "Brood",
            "ToolInterconnection",
            Arc::new(NoopProcessor),
            false,
        );
        assert!(matches!(
            registry.resolve("Brood", "ToolInterconnection"),
            Err(RegistryError::Disabled { .. })
        ));

        registry.register("Brood", "ToolInterconnection", Arc::new(NoopProcessor));
        assert!(registry.resolve("Brood", "ToolInterconnection").is_ok());
    }

    #[test]
    fn resolve_trims_input() {
        let mut registry = ProcessorRegistry::new();
        registry.register("users", "edit", Arc::new(NoopProcessor));
        assert!(registry.resolve("  users ", " edit").is_ok());
    }

    #[test]
    fn list_is_grouped_and_sorted_by_scope_then_action() {
        let mut registry = ProcessorRegistry::new();
        registry.register("users", "edit", Arc::new(NoopProcessor));
        registry.register("Organisation", "Create", Arc::new(NoopProcessor));
        registry.register_with_state("users", "delete", Arc::new(NoopProcessor), false);

        let scopes = registry.list().into_keys().collect::<Vec<_>>();
        assert_eq!(scopes, vec!["Organisation".to_string(), "users".to_string()]);

        let rows = registry
            .descriptors()
            .into_iter()
            .map(|row| (row.scope, row.action, row.enabled))
            .collect::<Vec<_>>();
        assert_eq!(
            rows,
            vec![
                ("Organisation".to_string(), "Create".to_string(), true),
                ("users".to_string(), "delete".to_string(), false),
                ("users".to_string(), "edit".to_string(), true),
            ]
        );
    }
}
