//! Errors raised while routing a record to its provider.

use thiserror::Error;

use crate::provider::ProviderKind;

/// A record could not be assigned to exactly one provider.
///
/// Routing errors are fatal for the record and never for the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The record carries no tag and no known discriminator field.
    #[error("record '{label}' matches no provider (fields: {fields})")]
    NoMatch {
        /// Record label for the report.
        label: String,
        /// Comma-separated field names found on the record.
        fields: String,
    },

    /// The record carries discriminators of more than one provider.
    #[error("record '{label}' matches several providers: {}", join_kinds(.providers))]
    Ambiguous {
        /// Record label for the report.
        label: String,
        /// Every provider whose discriminator matched.
        providers: Vec<ProviderKind>,
    },

    /// The record's tag disagrees with a discriminator it carries.
    #[error("record '{label}' is tagged {tagged} but carries {other} field '{field}'")]
    Conflict {
        /// Record label for the report.
        label: String,
        /// Provider named by the record's tag.
        tagged: ProviderKind,
        /// Provider owning the conflicting discriminator.
        other: ProviderKind,
        /// The conflicting discriminator field.
        field: String,
    },
}

fn join_kinds(kinds: &[ProviderKind]) -> String {
    kinds
        .iter()
        .copied()
        .map(ProviderKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RoutingError {
    /// Creates a no-match error listing the fields that were present.
    pub fn no_match<'a>(label: impl Into<String>, fields: impl Iterator<Item = &'a str>) -> Self {
        let fields = fields.collect::<Vec<_>>().join(", ");
        Self::NoMatch {
            label: label.into(),
            fields: if fields.is_empty() {
                "none".to_string()
            } else {
                fields
            },
        }
    }

    /// Creates an ambiguous-match error.
    pub fn ambiguous(label: impl Into<String>, providers: Vec<ProviderKind>) -> Self {
        Self::Ambiguous {
            label: label.into(),
            providers,
        }
    }

    /// Creates a tag/discriminator conflict error.
    pub fn conflict(
        label: impl Into<String>,
        tagged: ProviderKind,
        other: ProviderKind,
        field: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            label: label.into(),
            tagged,
            other,
            field: field.into(),
        }
    }
}
