//! Attendee contact validation hook.
//!
//! The admission core treats contacts as opaque. Deployments plug their own
//! format rules (email syntax, phone normalization) in through
//! [`ContactValidator`]; the default only insists on a JSON object.

use crate::domain::AttendeeContact;

/// Validates attendee contact details before admission is attempted.
pub trait ContactValidator: Send + Sync + std::fmt::Debug {
    /// Returns a human-readable message when the contact is unacceptable.
    ///
    /// # Errors
    ///
    /// Returns the validation failure message.
    fn validate(&self, contact: &AttendeeContact) -> Result<(), String>;
}

/// Accepts any JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectContactValidator;

impl ContactValidator for ObjectContactValidator {
    fn validate(&self, contact: &AttendeeContact) -> Result<(), String> {
        if contact.as_value().is_object() {
            Ok(())
        } else {
            Err("attendee_contact must be a JSON object".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_objects_only() {
        let v = ObjectContactValidator;
        assert!(v.validate(&AttendeeContact::new(serde_json::json!({"name": "Ari"}))).is_ok());
        assert!(v.validate(&AttendeeContact::new(serde_json::json!("Ari"))).is_err());
        assert!(v.validate(&AttendeeContact::new(serde_json::Value::Null)).is_err());
    }
}
