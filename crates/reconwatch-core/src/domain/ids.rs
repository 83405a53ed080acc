//! Strongly-typed UUID identifiers for every entity in the data model.
//!
//! Keeping these distinct (rather than passing `Uuid` everywhere) is what
//! stops a `JobId` from being handed to a function expecting a `RunId`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

id_type!(TargetId);
id_type!(RunId);
id_type!(JobId);
id_type!(ScanId);
id_type!(AssetId);
id_type!(ServiceId);
id_type!(EdgeId);
id_type!(FindingId);
id_type!(ScheduleId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types_with_shared_shape() {
        let t = TargetId::new();
        let r = RunId::new();
        assert_ne!(t.to_string(), "");
        assert_ne!(r.to_string(), "");
    }
}
