//! Identity: the discriminated union used as the primary key across every
//! resource kind the write engine touches.

use std::fmt;

/// Maximum byte length of an external id, per §6.
pub const MAX_EXTERNAL_ID_BYTES: usize = 255;

/// A reference to a cloud resource, either by internal numeric id or by a
/// caller-assigned external string id.
///
/// `Internal` and `External` are distinct even when their textual
/// representation coincides: `Identity::Internal(1)` and
/// `Identity::External("1".into())` compare unequal and hash differently,
/// so a `HashSet<Identity>` or `HashMap<Identity, _>` never conflates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// A server-assigned internal id. Always strictly positive.
    Internal(i64),
    /// A caller-assigned external id, 1..=255 UTF-8 bytes.
    External(String),
}

/// Error returned when constructing an [`Identity`] from raw input that
/// violates its invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// `Internal` ids must be strictly positive.
    #[error("internal id must be > 0, got {0}")]
    NonPositiveInternalId(i64),
    /// `External` ids must be 1..=255 UTF-8 bytes.
    #[error("external id must be 1..=255 UTF-8 bytes, got {0} bytes")]
    ExternalIdLength(usize),
}

impl Identity {
    /// Constructs an internal identity, validating that `id > 0`.
    pub fn internal(id: i64) -> Result<Self, IdentityError> {
        if id > 0 {
            Ok(Identity::Internal(id))
        } else {
            Err(IdentityError::NonPositiveInternalId(id))
        }
    }

    /// Constructs an external identity, validating its UTF-8 byte length.
    pub fn external(id: impl Into<String>) -> Result<Self, IdentityError> {
        let id = id.into();
        let len = id.len();
        if (1..=MAX_EXTERNAL_ID_BYTES).contains(&len) {
            Ok(Identity::External(id))
        } else {
            Err(IdentityError::ExternalIdLength(len))
        }
    }

    /// Returns the internal id, if this is an `Internal` identity.
    pub fn as_internal(&self) -> Option<i64> {
        match self {
            Identity::Internal(id) => Some(*id),
            Identity::External(_) => None,
        }
    }

    /// Returns the external id, if this is an `External` identity.
    pub fn as_external(&self) -> Option<&str> {
        match self {
            Identity::External(id) => Some(id),
            Identity::Internal(_) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Internal(id) => write!(f, "id:{id}"),
            Identity::External(id) => write!(f, "externalId:{id}"),
        }
    }
}

impl From<i64> for Identity {
    /// Infallible conversion for callers that already know the id is
    /// positive (e.g. ids read back from the cloud). Prefer
    /// [`Identity::internal`] when validating untrusted input.
    fn from(id: i64) -> Self {
        Identity::Internal(id)
    }
}
