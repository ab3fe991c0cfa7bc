use serde::{Deserialize, Serialize};

/// Capability implemented by every domain entity whose lifecycle the engine
/// governs. The rule set is selected by [`Subject::subject_type`], so domain
/// types only need to expose these fields.
pub trait Subject {
    /// Type tag used to look up the rule set (`"order"`, `"reservation"`, ...).
    fn subject_type(&self) -> &str;

    /// Domain class name reported to the remote authority. Defaults to the
    /// type tag.
    fn subject_class(&self) -> &str {
        self.subject_type()
    }

    fn id(&self) -> &str;

    fn tenant_id(&self) -> &str;

    fn status(&self) -> &str;

    fn entity_version(&self) -> i64;

    /// Wire reference for this subject in its current status.
    fn subject_ref(&self) -> SubjectRef {
        SubjectRef {
            subject_type: self.subject_type().to_string(),
            class: self.subject_class().to_string(),
            id: self.id().to_string(),
            tenant_id: self.tenant_id().to_string(),
            status: self.status().to_string(),
        }
    }
}

/// Subject reference as sent to the remote authority and carried in outbox
/// payloads: `{type, class, id, tenant_id, status}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRef {
    #[serde(rename = "type")]
    pub subject_type: String,
    pub class: String,
    pub id: String,
    pub tenant_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Booking {
        id: String,
        status: String,
    }

    impl Subject for Booking {
        fn subject_type(&self) -> &str {
            "reservation"
        }
        fn subject_class(&self) -> &str {
            "rentals::Booking"
        }
        fn id(&self) -> &str {
            &self.id
        }
        fn tenant_id(&self) -> &str {
            "tenant-1"
        }
        fn status(&self) -> &str {
            &self.status
        }
        fn entity_version(&self) -> i64 {
            3
        }
    }

    #[test]
    fn subject_ref_serializes_type_field() {
        let booking = Booking {
            id: "bk-1".to_string(),
            status: "pending".to_string(),
        };
        let json = serde_json::to_value(booking.subject_ref()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "reservation",
                "class": "rentals::Booking",
                "id": "bk-1",
                "tenant_id": "tenant-1",
                "status": "pending"
            })
        );
    }
}
