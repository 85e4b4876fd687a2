pub mod order;
pub mod purchase_order;
pub mod quotation;
pub mod request;

use crate::errors::WorkflowError;

/// Declares a string-backed record id that converts to and from [`crate::store::RecordId`].
macro_rules! record_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[derive(serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<crate::store::RecordId> for $name {
            fn from(id: crate::store::RecordId) -> Self {
                Self(id.0)
            }
        }

        impl crate::store::DocumentId for $name {
            fn record_id(&self) -> crate::store::RecordId {
                crate::store::RecordId(self.0.clone())
            }
        }
    };
}

pub(crate) use record_id;

pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<(), WorkflowError> {
    if value.trim().is_empty() {
        return Err(WorkflowError::Validation(format!("{field} is required")));
    }
    Ok(())
}
